//! Aggregation and recommendation engine
//!
//! Joins inventory, cost, utilization and pricing into one
//! [`AggregatedVmRow`] per VM. Every VM yields exactly one row; a missing
//! join leaves the affected fields empty and records why in the matching
//! [`DataStatus`].

use crate::collector::{Collection, Fetched, COST_WINDOW_DAYS};
use crate::models::{
    AggregatedVmRow, BillingClass, CostSample, DataStatus, LicenseMode, OsFamily, PriceQuote,
    UtilizationClass, UtilizationSample, VmRecord,
};
use crate::pricing::PriceCache;
use chrono::{DateTime, Duration, Utc};

const MONTHS_IN_WINDOW: f64 = 3.0;
const HOURS_PER_MONTH: f64 = 24.0 * 31.0;
const HOURS_PER_YEAR: f64 = 24.0 * 365.0;

/// Classify CPU usage. The first matching rule wins.
pub fn classify(sample: Option<&UtilizationSample>) -> UtilizationClass {
    let Some(sample) = sample else {
        return UtilizationClass::NoData;
    };
    let (avg, peak) = (sample.avg_cpu, sample.peak_cpu);

    if avg < 10.0 && peak < 30.0 {
        UtilizationClass::VeryLow
    } else if avg < 20.0 && peak < 50.0 {
        UtilizationClass::Low
    } else if avg > 70.0 || peak > 90.0 {
        UtilizationClass::High
    } else {
        UtilizationClass::Normal
    }
}

/// Percentage saved by moving from `payg` to `reserved`
pub fn savings_pct(payg: Option<f64>, reserved: Option<f64>) -> Option<f64> {
    match (payg, reserved) {
        (Some(payg), Some(reserved)) if payg > 0.0 => Some((payg - reserved) / payg * 100.0),
        _ => None,
    }
}

/// Hourly rates a VM actually pays
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EffectiveRates {
    pub payg: Option<f64>,
    pub ri1y: Option<f64>,
    pub ri3y: Option<f64>,
}

impl EffectiveRates {
    /// Windows quotes carry the license in PAYG but not in the reserved
    /// compute rate, so the license is added back to the reserved rates.
    /// Without a known license rate the reserved rates stay empty.
    pub fn from_quote(quote: &PriceQuote, class: BillingClass) -> Self {
        let license = match class {
            BillingClass::Windows => quote.windows_license_hourly,
            BillingClass::Linux => Some(0.0),
        };
        let with_license = |rate: Option<f64>| rate.zip(license).map(|(r, l)| r + l);
        Self {
            payg: quote.payg_hourly,
            ri1y: with_license(quote.ri1y_hourly),
            ri3y: with_license(quote.ri3y_hourly),
        }
    }

    /// Whether a reserved rate exists but could not be priced with its license
    pub fn missing_license(quote: &PriceQuote, class: BillingClass) -> bool {
        class == BillingClass::Windows
            && quote.windows_license_hourly.is_none()
            && (quote.ri1y_hourly.is_some() || quote.ri3y_hourly.is_some())
    }

    pub fn savings_1y(&self) -> Option<f64> {
        savings_pct(self.payg, self.ri1y)
    }

    pub fn savings_3y(&self) -> Option<f64> {
        savings_pct(self.payg, self.ri3y)
    }
}

fn status_of<T>(fetched: &Fetched<T>) -> DataStatus {
    match fetched {
        Fetched::Value(_) => DataStatus::Ok,
        Fetched::NoData => DataStatus::NoData,
        Fetched::Failed(_) => DataStatus::Failed,
    }
}

fn is_new(vm: &VmRecord, cost: Option<&CostSample>, now: DateTime<Utc>) -> bool {
    if let Some(created) = vm.created_at {
        return now - created < Duration::days(COST_WINDOW_DAYS);
    }
    cost.map(|c| i64::from(c.active_days) < COST_WINDOW_DAYS)
        .unwrap_or(false)
}

/// Build the report row of one VM
pub fn aggregate_vm(
    vm: &VmRecord,
    cost: Fetched<&CostSample>,
    utilization: Fetched<&UtilizationSample>,
    price: Fetched<&PriceQuote>,
    now: DateTime<Utc>,
) -> AggregatedVmRow {
    let cost_status = match &cost {
        Fetched::Value(sample) if !sample.complete => DataStatus::Partial,
        other => status_of(other),
    };
    let cost_sample = cost.value().copied();
    let total = cost_sample.map(|c| c.total_cost);
    let monthly = total.map(|t| t / MONTHS_IN_WINDOW);

    let util_sample = utilization.value().copied();

    let class = vm.price_key().class;
    let quote = price.value().copied();
    let rates = quote
        .map(|q| EffectiveRates::from_quote(q, class))
        .unwrap_or_default();

    AggregatedVmRow {
        subscription_id: vm.subscription_id.clone(),
        resource_group: vm.resource_group.clone(),
        name: vm.name.clone(),
        id: vm.id.clone(),
        region: vm.region.clone(),
        size: vm.size.clone(),
        os: vm.os,
        license: vm.license,
        created_at: vm.created_at,
        is_new: is_new(vm, cost_sample, now),
        payg_license_flag: vm.os == OsFamily::Windows && vm.license == LicenseMode::Payg,

        cost_status,
        currency: cost_sample
            .map(|c| c.currency.clone())
            .or_else(|| quote.map(|q| q.currency.clone())),
        total_cost_90d: total,
        monthly_avg_cost: monthly,
        yearly_projection: monthly.map(|m| m * 12.0),
        three_year_projection: monthly.map(|m| m * 36.0),

        utilization_status: status_of(&utilization),
        avg_cpu: util_sample.map(|u| u.avg_cpu),
        peak_cpu: util_sample.map(|u| u.peak_cpu),
        utilization: classify(util_sample),

        pricing_status: match quote {
            Some(q) if EffectiveRates::missing_license(q, class) => DataStatus::Partial,
            _ => status_of(&price),
        },
        payg_hourly: rates.payg,
        payg_monthly: rates.payg.map(|p| p * HOURS_PER_MONTH),
        payg_yearly: rates.payg.map(|p| p * HOURS_PER_YEAR),
        ri1y_hourly: rates.ri1y,
        ri1y_yearly: rates.ri1y.map(|r| r * HOURS_PER_YEAR),
        ri3y_hourly: rates.ri3y,
        ri3y_yearly: rates.ri3y.map(|r| r * HOURS_PER_YEAR),
        spot_hourly: quote.and_then(|q| q.spot_hourly),
        spot_monthly: quote.and_then(|q| q.spot_hourly).map(|s| s * HOURS_PER_MONTH),
        low_priority_hourly: quote.and_then(|q| q.low_priority_hourly),
        low_priority_monthly: quote
            .and_then(|q| q.low_priority_hourly)
            .map(|s| s * HOURS_PER_MONTH),
        windows_license_hourly: quote.and_then(|q| q.windows_license_hourly),
        savings_pct_1y: rates.savings_1y(),
        savings_pct_3y: rates.savings_3y(),
    }
}

/// Join the collected data of one subscription, one row per VM in inventory order
pub fn aggregate(
    inventory: &[VmRecord],
    costs: &Collection<CostSample>,
    utilization: &Collection<UtilizationSample>,
    prices: &PriceCache,
    now: DateTime<Utc>,
) -> Vec<AggregatedVmRow> {
    inventory
        .iter()
        .map(|vm| {
            let key = vm.join_key();
            aggregate_vm(
                vm,
                costs.lookup(&key),
                utilization.lookup(&key),
                prices.get(&vm.price_key()),
                now,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceKey;
    use crate::pricing::{quote_from_items, RetailPriceItem};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn vm(name: &str, os: OsFamily, license: LicenseMode) -> VmRecord {
        VmRecord {
            id: format!("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/{}", name),
            subscription_id: "s".into(),
            resource_group: "rg".into(),
            name: name.into(),
            size: "Standard_D2s_v3".into(),
            region: "eastus".into(),
            os,
            license,
            created_at: None,
        }
    }

    fn cost(vm: &VmRecord, total: f64, active_days: u32) -> CostSample {
        CostSample {
            resource_id: vm.join_key(),
            total_cost: total,
            currency: "USD".into(),
            window_start: now() - Duration::days(90),
            window_end: now(),
            active_days,
            complete: true,
        }
    }

    fn util(avg: f64, peak: f64) -> UtilizationSample {
        UtilizationSample {
            resource_id: "vm".into(),
            avg_cpu: avg,
            peak_cpu: peak,
            sample_count: 720,
        }
    }

    #[test]
    fn test_classification_rules() {
        assert_eq!(classify(Some(&util(5.0, 20.0))), UtilizationClass::VeryLow);
        assert_eq!(classify(Some(&util(15.0, 40.0))), UtilizationClass::Low);
        assert_eq!(classify(Some(&util(80.0, 60.0))), UtilizationClass::High);
        assert_eq!(classify(Some(&util(40.0, 60.0))), UtilizationClass::Normal);
        assert_eq!(classify(Some(&util(30.0, 95.0))), UtilizationClass::High);
        assert_eq!(classify(None), UtilizationClass::NoData);
    }

    #[test]
    fn test_low_average_with_spiky_peak() {
        // avg qualifies for "low" but the peak does not
        assert_eq!(classify(Some(&util(15.0, 95.0))), UtilizationClass::High);
        assert_eq!(classify(Some(&util(5.0, 45.0))), UtilizationClass::Low);
    }

    #[test]
    fn test_cost_projections() {
        let vm = vm("vm1", OsFamily::Linux, LicenseMode::Payg);
        let sample = cost(&vm, 300.0, 90);
        let row = aggregate_vm(&vm, Fetched::Value(&sample), Fetched::NoData, Fetched::NoData, now());

        assert_eq!(row.cost_status, DataStatus::Ok);
        assert_eq!(row.total_cost_90d, Some(300.0));
        assert_eq!(row.monthly_avg_cost, Some(100.0));
        assert_eq!(row.yearly_projection, Some(1200.0));
        assert_eq!(row.three_year_projection, Some(3600.0));
        assert_eq!(row.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_windows_payg_savings_include_license() {
        let vm = vm("win1", OsFamily::Windows, LicenseMode::Payg);
        let quote = PriceQuote {
            currency: "USD".into(),
            payg_hourly: Some(0.20),
            ri1y_hourly: Some(0.12),
            windows_license_hourly: Some(0.02),
            ..Default::default()
        };
        let row = aggregate_vm(&vm, Fetched::NoData, Fetched::NoData, Fetched::Value(&quote), now());

        assert!(row.payg_license_flag);
        assert!((row.ri1y_hourly.unwrap() - 0.14).abs() < 1e-9);
        assert!((row.savings_pct_1y.unwrap() - 30.0).abs() < 1e-9);
        assert_eq!(row.savings_pct_3y, None);
        assert!((row.payg_monthly.unwrap() - 0.20 * 744.0).abs() < 1e-9);
        assert!((row.payg_yearly.unwrap() - 0.20 * 8760.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_windows_license_leaves_reserved_empty() {
        let vm = vm("win3", OsFamily::Windows, LicenseMode::Payg);
        let items = vec![
            RetailPriceItem {
                product_name: "Virtual Machines DSv3 Series Windows".into(),
                sku_name: "D2s v3".into(),
                price_type: "Consumption".into(),
                retail_price: 0.20,
                ..Default::default()
            },
            RetailPriceItem {
                product_name: "Virtual Machines DSv3 Series".into(),
                sku_name: "D2s v3".into(),
                price_type: "Reservation".into(),
                reservation_term: Some("1 Year".into()),
                retail_price: 0.12 * 8760.0,
                ..Default::default()
            },
        ];
        let quote = quote_from_items(&items, BillingClass::Windows).unwrap();
        assert_eq!(quote.windows_license_hourly, None);

        let rates = EffectiveRates::from_quote(&quote, BillingClass::Windows);
        assert_eq!(rates.payg, Some(0.20));
        assert_eq!(rates.ri1y, None);
        assert_eq!(rates.savings_1y(), None);

        let row = aggregate_vm(&vm, Fetched::NoData, Fetched::NoData, Fetched::Value(&quote), now());
        assert_eq!(row.pricing_status, DataStatus::Partial);
        assert_eq!(row.payg_hourly, Some(0.20));
        assert_eq!(row.ri1y_hourly, None);
        assert_eq!(row.ri1y_yearly, None);
        assert_eq!(row.savings_pct_1y, None);
        assert_eq!(row.savings_pct_3y, None);
    }

    #[test]
    fn test_hybrid_benefit_uses_base_rates() {
        let vm = vm("win2", OsFamily::Windows, LicenseMode::AzureHybridBenefit);
        assert_eq!(vm.price_key().class, BillingClass::Linux);

        let quote = PriceQuote {
            currency: "USD".into(),
            payg_hourly: Some(0.10),
            ri3y_hourly: Some(0.04),
            ..Default::default()
        };
        let row = aggregate_vm(&vm, Fetched::NoData, Fetched::NoData, Fetched::Value(&quote), now());
        assert!(!row.payg_license_flag);
        assert!((row.savings_pct_3y.unwrap() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_payg_has_no_savings() {
        assert_eq!(savings_pct(Some(0.0), Some(0.0)), None);
        assert_eq!(savings_pct(None, Some(0.1)), None);
        assert_eq!(savings_pct(Some(0.1), None), None);
    }

    #[test]
    fn test_missing_cost_still_classifies_utilization() {
        let vm = vm("vm1", OsFamily::Linux, LicenseMode::Payg);
        let sample = util(5.0, 10.0);
        let row = aggregate_vm(
            &vm,
            Fetched::Failed("query failed".into()),
            Fetched::Value(&sample),
            Fetched::NoData,
            now(),
        );

        assert_eq!(row.cost_status, DataStatus::Failed);
        assert_eq!(row.total_cost_90d, None);
        assert_eq!(row.utilization, UtilizationClass::VeryLow);
        assert_eq!(row.utilization_status, DataStatus::Ok);
        assert_eq!(row.pricing_status, DataStatus::NoData);
    }

    #[test]
    fn test_incomplete_cost_is_partial() {
        let vm = vm("vm1", OsFamily::Linux, LicenseMode::Payg);
        let mut sample = cost(&vm, 30.0, 10);
        sample.complete = false;
        let row = aggregate_vm(&vm, Fetched::Value(&sample), Fetched::NoData, Fetched::NoData, now());
        assert_eq!(row.cost_status, DataStatus::Partial);
        assert_eq!(row.total_cost_90d, Some(30.0));
    }

    #[test]
    fn test_new_vm_detection() {
        let mut recent = vm("new", OsFamily::Linux, LicenseMode::Payg);
        recent.created_at = Some(now() - Duration::days(10));
        assert!(is_new(&recent, None, now()));

        let mut old = vm("old", OsFamily::Linux, LicenseMode::Payg);
        old.created_at = Some(now() - Duration::days(200));
        let sample = cost(&old, 10.0, 5);
        assert!(!is_new(&old, Some(&sample), now()));

        let unknown = vm("unknown", OsFamily::Linux, LicenseMode::Payg);
        assert!(is_new(&unknown, Some(&cost(&unknown, 10.0, 30)), now()));
        assert!(!is_new(&unknown, Some(&cost(&unknown, 10.0, 90)), now()));
        assert!(!is_new(&unknown, None, now()));
    }

    #[test]
    fn test_one_row_per_vm() {
        let inventory = vec![
            vm("a", OsFamily::Linux, LicenseMode::Payg),
            vm("b", OsFamily::Windows, LicenseMode::Payg),
            vm("c", OsFamily::Windows, LicenseMode::AzureHybridBenefit),
        ];
        let mut costs = Collection::new();
        costs.insert(inventory[0].join_key(), cost(&inventory[0], 90.0, 90));
        let mut utilization = Collection::new();
        utilization.record_failure(inventory[1].join_key(), "throttled");

        let mut prices = PriceCache::new();
        prices.insert(
            PriceKey::new("eastus", "Standard_D2s_v3", BillingClass::Linux),
            PriceQuote {
                currency: "USD".into(),
                payg_hourly: Some(0.1),
                ..Default::default()
            },
        );

        let rows = aggregate(&inventory, &costs, &utilization, &prices, now());

        assert_eq!(rows.len(), 3);
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(rows[0].cost_status, DataStatus::Ok);
        assert_eq!(rows[1].cost_status, DataStatus::NoData);
        assert_eq!(rows[1].utilization_status, DataStatus::Failed);
        assert_eq!(rows[1].utilization, UtilizationClass::NoData);
        assert_eq!(rows[1].pricing_status, DataStatus::NoData);
        assert_eq!(rows[2].pricing_status, DataStatus::Ok);
    }
}
