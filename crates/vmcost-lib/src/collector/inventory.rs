//! VM inventory collection from the Compute API

use crate::arm::ArmClient;
use crate::error::SubscriptionError;
use crate::models::{LicenseMode, OsFamily, VmRecord};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, warn};

const COMPUTE_API_VERSION: &str = "2024-07-01";

/// Upper bound on `nextLink` pages for one subscription
pub(crate) const MAX_PAGES: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VmListResponse {
    #[serde(default)]
    value: Vec<ArmVirtualMachine>,
    #[serde(default)]
    next_link: Option<String>,
}

/// Virtual machine as returned by `Microsoft.Compute/virtualMachines`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArmVirtualMachine {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub properties: Option<VmProperties>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmProperties {
    #[serde(default)]
    pub hardware_profile: Option<HardwareProfile>,
    #[serde(default)]
    pub storage_profile: Option<StorageProfile>,
    #[serde(default)]
    pub license_type: Option<String>,
    #[serde(default)]
    pub time_created: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    #[serde(default)]
    pub vm_size: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    #[serde(default)]
    pub os_disk: Option<OsDisk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    #[serde(default)]
    pub os_type: Option<String>,
}

impl VmRecord {
    /// Normalize a compute API entry.
    ///
    /// Returns `None` when the entry lacks an id, name, size or location.
    pub fn from_arm(subscription_id: &str, vm: &ArmVirtualMachine) -> Option<Self> {
        let id = vm.id.as_deref().filter(|s| !s.is_empty())?;
        let name = vm.name.as_deref().filter(|s| !s.is_empty())?;
        let region = vm.location.as_deref().filter(|s| !s.is_empty())?;
        let properties = vm.properties.as_ref()?;
        let size = properties
            .hardware_profile
            .as_ref()
            .and_then(|h| h.vm_size.as_deref())
            .filter(|s| !s.is_empty())?;
        let os_type = properties
            .storage_profile
            .as_ref()
            .and_then(|s| s.os_disk.as_ref())
            .and_then(|d| d.os_type.as_deref());

        Some(VmRecord {
            id: id.to_string(),
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group_of(id).unwrap_or_default(),
            name: name.to_string(),
            size: size.to_string(),
            region: region.to_lowercase(),
            os: OsFamily::from_os_type(os_type),
            license: LicenseMode::from_license_type(properties.license_type.as_deref()),
            created_at: properties
                .time_created
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
        })
    }
}

/// Extract the resource group segment of an ARM id
fn resource_group_of(resource_id: &str) -> Option<String> {
    let mut segments = resource_id.split('/');
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments.next().map(|s| s.to_string());
        }
    }
    None
}

/// Lists the virtual machines of a subscription
pub struct InventoryCollector<'a> {
    arm: &'a ArmClient,
}

impl<'a> InventoryCollector<'a> {
    pub fn new(arm: &'a ArmClient) -> Self {
        Self { arm }
    }

    /// Collect every VM in the subscription.
    ///
    /// Authentication, permission and not-found errors are fatal for the
    /// subscription, as is an empty inventory.
    pub async fn collect(&self, subscription_id: &str) -> Result<Vec<VmRecord>, SubscriptionError> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Compute/virtualMachines",
            subscription_id
        );
        let mut url = self
            .arm
            .url(&path)
            .map_err(|e| SubscriptionError::from_inventory(subscription_id, e))?;
        url.query_pairs_mut()
            .append_pair("api-version", COMPUTE_API_VERSION);

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(url);
        let mut pages = 0;

        while let Some(page_url) = next.take() {
            if pages >= MAX_PAGES {
                warn!(
                    subscription = %subscription_id,
                    pages = pages,
                    "VM listing exceeded page limit, remaining pages ignored"
                );
                break;
            }
            pages += 1;

            let page: VmListResponse = self
                .arm
                .get(page_url)
                .await
                .map_err(|e| SubscriptionError::from_inventory(subscription_id, e))?;

            for vm in &page.value {
                match VmRecord::from_arm(subscription_id, vm) {
                    Some(record) => {
                        if seen.insert(record.join_key()) {
                            records.push(record);
                        }
                    }
                    None => warn!(
                        subscription = %subscription_id,
                        vm = ?vm.name,
                        "Skipping malformed VM entry"
                    ),
                }
            }

            if let Some(link) = page.next_link.filter(|l| !l.is_empty()) {
                next = Some(
                    self.arm
                        .url(&link)
                        .map_err(|e| SubscriptionError::from_inventory(subscription_id, e))?,
                );
            }
        }

        debug!(subscription = %subscription_id, count = records.len(), "Listed virtual machines");

        if records.is_empty() {
            return Err(SubscriptionError::NoVirtualMachines(subscription_id.to_string()));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_group_of() {
        assert_eq!(
            resource_group_of("/subscriptions/s/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines/vm1"),
            Some("rg-web".to_string())
        );
        assert_eq!(
            resource_group_of("/subscriptions/s/resourcegroups/RG2/providers/x/y/z"),
            Some("RG2".to_string())
        );
        assert_eq!(resource_group_of("/subscriptions/s"), None);
    }

    #[test]
    fn test_from_arm_requires_size() {
        let vm: ArmVirtualMachine = serde_json::from_str(
            r#"{"id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1",
                "name": "vm1", "location": "eastus", "properties": {}}"#,
        )
        .unwrap();
        assert!(VmRecord::from_arm("s", &vm).is_none());
    }

    #[test]
    fn test_from_arm_normalizes_fields() {
        let vm: ArmVirtualMachine = serde_json::from_str(
            r#"{"id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/win1",
                "name": "win1", "location": "WestEurope",
                "properties": {
                    "hardwareProfile": {"vmSize": "Standard_D4s_v5"},
                    "storageProfile": {"osDisk": {"osType": "Windows"}},
                    "licenseType": "Windows_Server",
                    "timeCreated": "2024-03-01T10:00:00.0000000+00:00"
                }}"#,
        )
        .unwrap();
        let record = VmRecord::from_arm("s", &vm).unwrap();
        assert_eq!(record.region, "westeurope");
        assert_eq!(record.resource_group, "rg");
        assert_eq!(record.os, OsFamily::Windows);
        assert_eq!(record.license, LicenseMode::AzureHybridBenefit);
        assert!(record.created_at.is_some());
    }
}
