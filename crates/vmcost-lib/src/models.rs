//! Core data models for the VM cost report
//!
//! Every upstream payload is normalized into one of these types before the
//! aggregation engine sees it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating system family of a VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsFamily {
    Linux,
    Windows,
}

impl OsFamily {
    /// Parse the `osType` reported by the compute API.
    ///
    /// Anything that is not Windows is billed as Linux.
    pub fn from_os_type(os_type: Option<&str>) -> Self {
        match os_type {
            Some(value) if value.eq_ignore_ascii_case("windows") => OsFamily::Windows,
            _ => OsFamily::Linux,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsFamily::Linux => write!(f, "Linux"),
            OsFamily::Windows => write!(f, "Windows"),
        }
    }
}

/// How the OS license of a VM is paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseMode {
    /// License cost bundled into the hourly rate
    #[serde(rename = "PAYG")]
    Payg,
    /// Azure Hybrid Benefit: customer brings their own license
    #[serde(rename = "AHB")]
    AzureHybridBenefit,
}

impl LicenseMode {
    /// Parse the `licenseType` property of a VM.
    ///
    /// `Windows_Server`, `Windows_Client`, `RHEL_BYOS` and `SLES_BYOS` all mean
    /// the license is brought by the customer.
    pub fn from_license_type(license_type: Option<&str>) -> Self {
        match license_type {
            Some(value) if !value.trim().is_empty() && !value.eq_ignore_ascii_case("none") => {
                LicenseMode::AzureHybridBenefit
            }
            _ => LicenseMode::Payg,
        }
    }
}

impl fmt::Display for LicenseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseMode::Payg => write!(f, "PAYG"),
            LicenseMode::AzureHybridBenefit => write!(f, "AHB"),
        }
    }
}

/// Static attributes of a VM taken from the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    /// Full ARM resource id
    pub id: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
    pub size: String,
    pub region: String,
    pub os: OsFamily,
    pub license: LicenseMode,
    pub created_at: Option<DateTime<Utc>>,
}

impl VmRecord {
    /// Key used to join cost and utilization samples to this VM
    pub fn join_key(&self) -> String {
        resource_key(&self.id)
    }

    /// Key of the price quote that applies to this VM
    pub fn price_key(&self) -> PriceKey {
        PriceKey::new(&self.region, &self.size, BillingClass::for_vm(self.os, self.license))
    }
}

/// Normalize an ARM resource id for joining.
///
/// Cost Management reports ids lower-cased, the compute API does not.
pub fn resource_key(resource_id: &str) -> String {
    resource_id.trim().trim_end_matches('/').to_lowercase()
}

/// 90-day actual cost of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSample {
    pub resource_id: String,
    pub total_cost: f64,
    pub currency: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Days inside the window with a non-zero charge
    pub active_days: u32,
    /// False when some result pages could not be read
    pub complete: bool,
}

/// 30-day CPU statistics of one VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub resource_id: String,
    pub avg_cpu: f64,
    pub peak_cpu: f64,
    pub sample_count: usize,
}

/// Billing class used to pick a price series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingClass {
    /// License-free base compute rate
    Linux,
    /// Windows license bundled into the PAYG rate
    Windows,
}

impl BillingClass {
    /// Only Windows VMs paying for their license use the Windows series.
    pub fn for_vm(os: OsFamily, license: LicenseMode) -> Self {
        match (os, license) {
            (OsFamily::Windows, LicenseMode::Payg) => BillingClass::Windows,
            _ => BillingClass::Linux,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingClass::Linux => "linux",
            BillingClass::Windows => "windows",
        }
    }
}

impl FromStr for BillingClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(BillingClass::Linux),
            "windows" => Ok(BillingClass::Windows),
            other => Err(format!("unknown billing class '{}'", other)),
        }
    }
}

/// Cache key of a price quote
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriceKey {
    pub region: String,
    pub size: String,
    pub class: BillingClass,
}

impl PriceKey {
    pub fn new(region: &str, size: &str, class: BillingClass) -> Self {
        Self {
            region: region.to_lowercase(),
            size: size.to_string(),
            class,
        }
    }

    /// The same region and size under the other billing class
    pub fn with_class(&self, class: BillingClass) -> Self {
        Self {
            region: self.region.clone(),
            size: self.size.clone(),
            class,
        }
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.region, self.size, self.class.as_str())
    }
}

impl FromStr for PriceKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('|');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(region), Some(size), Some(class), None) if !region.is_empty() && !size.is_empty() => {
                Ok(PriceKey::new(region, size, class.parse()?))
            }
            _ => Err(format!("malformed price key '{}'", s)),
        }
    }
}

/// Hourly unit prices for one price key
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceQuote {
    pub currency: String,
    pub payg_hourly: Option<f64>,
    /// Reserved compute rate; never includes a license
    pub ri1y_hourly: Option<f64>,
    pub ri3y_hourly: Option<f64>,
    pub spot_hourly: Option<f64>,
    pub low_priority_hourly: Option<f64>,
    /// Windows license add-on, only set for the Windows billing class
    pub windows_license_hourly: Option<f64>,
}

/// CPU-based sizing recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtilizationClass {
    #[serde(rename = "very low")]
    VeryLow,
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "no data")]
    NoData,
}

impl UtilizationClass {
    pub fn label(&self) -> &'static str {
        match self {
            UtilizationClass::VeryLow => "very low",
            UtilizationClass::Low => "low",
            UtilizationClass::High => "high",
            UtilizationClass::Normal => "normal",
            UtilizationClass::NoData => "no data",
        }
    }

    /// Action suggested to the reader of the report
    pub fn advice(&self) -> &'static str {
        match self {
            UtilizationClass::VeryLow => "downsize or deallocate",
            UtilizationClass::Low => "review sizing",
            UtilizationClass::High => "consider upgrading",
            UtilizationClass::Normal => "no action",
            UtilizationClass::NoData => "no metrics available",
        }
    }
}

impl fmt::Display for UtilizationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a joined source delivered data for a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStatus {
    Ok,
    /// The source answered but had nothing for this VM
    NoData,
    /// Data was read but some of it is missing
    Partial,
    /// The source call failed
    Failed,
}

impl fmt::Display for DataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataStatus::Ok => write!(f, "ok"),
            DataStatus::NoData => write!(f, "no data"),
            DataStatus::Partial => write!(f, "partial"),
            DataStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One row of the comparison report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedVmRow {
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
    pub id: String,
    pub region: String,
    pub size: String,
    pub os: OsFamily,
    pub license: LicenseMode,
    pub created_at: Option<DateTime<Utc>>,
    pub is_new: bool,
    /// Windows VM paying for its license (Hybrid Benefit candidate)
    pub payg_license_flag: bool,

    pub cost_status: DataStatus,
    pub currency: Option<String>,
    pub total_cost_90d: Option<f64>,
    pub monthly_avg_cost: Option<f64>,
    pub yearly_projection: Option<f64>,
    pub three_year_projection: Option<f64>,

    pub utilization_status: DataStatus,
    pub avg_cpu: Option<f64>,
    pub peak_cpu: Option<f64>,
    pub utilization: UtilizationClass,

    pub pricing_status: DataStatus,
    pub payg_hourly: Option<f64>,
    pub payg_monthly: Option<f64>,
    pub payg_yearly: Option<f64>,
    pub ri1y_hourly: Option<f64>,
    pub ri1y_yearly: Option<f64>,
    pub ri3y_hourly: Option<f64>,
    pub ri3y_yearly: Option<f64>,
    pub spot_hourly: Option<f64>,
    pub spot_monthly: Option<f64>,
    pub low_priority_hourly: Option<f64>,
    pub low_priority_monthly: Option<f64>,
    pub windows_license_hourly: Option<f64>,
    pub savings_pct_1y: Option<f64>,
    pub savings_pct_3y: Option<f64>,
}
