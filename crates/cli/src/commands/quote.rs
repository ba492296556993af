//! The `quote` command: effective rates for one VM size

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;
use vmcost_lib::aggregate::EffectiveRates;
use vmcost_lib::models::{BillingClass, DataStatus, LicenseMode, OsFamily, PriceKey, PriceQuote};
use vmcost_lib::pricing::RetailPriceClient;
use vmcost_lib::report::PRICING_FILE;
use vmcost_lib::Fetched;

use super::{ensure_dir, load_price_cache};
use crate::config::Settings;
use crate::output::{
    format_currency, format_pct, format_rate, print_json, print_table, print_warning,
    OutputFormat,
};

const HOURS_PER_MONTH: f64 = 24.0 * 31.0;
const HOURS_PER_YEAR: f64 = 24.0 * 365.0;

/// Operating system argument
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OsArg {
    #[default]
    Linux,
    Windows,
}

impl From<OsArg> for OsFamily {
    fn from(os: OsArg) -> Self {
        match os {
            OsArg::Linux => OsFamily::Linux,
            OsArg::Windows => OsFamily::Windows,
        }
    }
}

/// Options of the `quote` command
#[derive(Debug, Clone)]
pub struct QuoteOptions {
    pub region: String,
    pub size: String,
    pub os: OsArg,
    pub ahb: bool,
    pub output_dir: Option<PathBuf>,
    pub format: OutputFormat,
}

/// Row for the pricing tier table
#[derive(Tabled, Serialize)]
struct TierRow {
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Hourly")]
    hourly: String,
    #[tabled(rename = "Monthly")]
    monthly: String,
    #[tabled(rename = "Yearly")]
    yearly: String,
    #[tabled(rename = "Savings vs PAYG")]
    savings: String,
}

#[derive(Serialize)]
struct QuoteOutput<'a> {
    key: String,
    quote: &'a PriceQuote,
    effective_payg_hourly: Option<f64>,
    effective_ri1y_hourly: Option<f64>,
    effective_ri3y_hourly: Option<f64>,
    savings_pct_1y: Option<f64>,
    savings_pct_3y: Option<f64>,
}

fn tier(name: &str, hourly: Option<f64>, currency: &str, savings: Option<f64>) -> TierRow {
    let scaled = |hours: f64| match hourly {
        Some(h) => format_currency(Some(h * hours), currency, DataStatus::Ok),
        None => "-".dimmed().to_string(),
    };
    TierRow {
        tier: name.to_string(),
        hourly: format_rate(hourly, currency),
        monthly: scaled(HOURS_PER_MONTH),
        yearly: scaled(HOURS_PER_YEAR),
        savings: format_pct(savings),
    }
}

fn tier_rows(quote: &PriceQuote, rates: &EffectiveRates) -> Vec<TierRow> {
    let currency = quote.currency.as_str();
    vec![
        tier("Pay-as-you-go", rates.payg, currency, None),
        tier("1-year reserved", rates.ri1y, currency, rates.savings_1y()),
        tier("3-year reserved", rates.ri3y, currency, rates.savings_3y()),
        tier("Spot", quote.spot_hourly, currency, None),
        tier("Low priority", quote.low_priority_hourly, currency, None),
    ]
}

/// Resolve and print the rates of one price key
pub async fn run_quote(settings: &Settings, options: QuoteOptions) -> Result<()> {
    let license = if options.ahb {
        LicenseMode::AzureHybridBenefit
    } else {
        LicenseMode::Payg
    };
    let class = BillingClass::for_vm(options.os.into(), license);
    let key = PriceKey::new(&options.region, &options.size, class);

    let output_dir = options
        .output_dir
        .unwrap_or_else(|| settings.output_dir.clone());
    ensure_dir(&output_dir)?;
    let cache_path = output_dir.join(PRICING_FILE);

    let source = RetailPriceClient::new(&settings.pricing_endpoint, settings.request_timeout())?;
    let mut cache = load_price_cache(&cache_path, false);

    let quote = match cache.quote(&source, &key).await {
        Fetched::Value(quote) => quote,
        Fetched::NoData => anyhow::bail!("No retail price found for {}", key),
        Fetched::Failed(reason) => anyhow::bail!("Price lookup for {} failed: {}", key, reason),
    };

    cache
        .save(&cache_path)
        .with_context(|| format!("Failed to save price cache to {}", cache_path.display()))?;

    let rates = EffectiveRates::from_quote(&quote, class);
    match options.format {
        OutputFormat::Json => print_json(&QuoteOutput {
            key: key.to_string(),
            quote: &quote,
            effective_payg_hourly: rates.payg,
            effective_ri1y_hourly: rates.ri1y,
            effective_ri3y_hourly: rates.ri3y,
            savings_pct_1y: rates.savings_1y(),
            savings_pct_3y: rates.savings_3y(),
        }),
        OutputFormat::Table => {
            println!(
                "{} {} in {} ({})",
                "Prices for".bold(),
                key.size.cyan(),
                key.region.cyan(),
                class.as_str()
            );
            print_table(&tier_rows(&quote, &rates), OutputFormat::Table);
            if let Some(license) = quote.windows_license_hourly {
                println!(
                    "Windows license: {} per hour, included in every rate above",
                    format_rate(Some(license), &quote.currency)
                );
            }
            if EffectiveRates::missing_license(&quote, class) {
                print_warning("Windows license rate unknown: reserved rates cannot be compared");
            }
            if options.ahb && matches!(options.os, OsArg::Windows) {
                print_warning("Hybrid Benefit assumed: rates exclude the Windows license");
            }
        }
    }

    Ok(())
}
