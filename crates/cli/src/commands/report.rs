//! The `report` command

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tabled::Tabled;
use tracing::debug;
use vmcost_lib::credential::{default_credential, CachedToken};
use vmcost_lib::pipeline::{parse_subscription_list, Pipeline, Progress, RunSummary};
use vmcost_lib::pricing::RetailPriceClient;
use vmcost_lib::report::{write_reports, ReportPaths};
use vmcost_lib::{AggregatedVmRow, ArmClient};

use super::{ensure_dir, load_price_cache};
use crate::config::Settings;
use crate::output::{
    color_utilization, format_currency, format_pct, print_error, print_info, print_json,
    print_success, print_table, print_warning, OutputFormat,
};

/// Options of the `report` command
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub subscriptions: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub refresh_pricing: bool,
    pub format: OutputFormat,
}

/// Row for the per-VM summary table
#[derive(Tabled, serde::Serialize)]
struct VmRow {
    #[tabled(rename = "VM")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "OS / License")]
    os: String,
    #[tabled(rename = "90-day Cost")]
    total: String,
    #[tabled(rename = "Monthly Avg")]
    monthly: String,
    #[tabled(rename = "CPU avg/peak")]
    cpu: String,
    #[tabled(rename = "Utilization")]
    utilization: String,
    #[tabled(rename = "PAYG/Month")]
    payg_monthly: String,
    #[tabled(rename = "1y RI Savings")]
    savings_1y: String,
    #[tabled(rename = "3y RI Savings")]
    savings_3y: String,
}

impl VmRow {
    fn from_row(row: &AggregatedVmRow) -> Self {
        let currency = row.currency.as_deref().unwrap_or("USD");
        let mut os = format!("{} / {}", row.os, row.license);
        if row.payg_license_flag {
            os = format!("{} {}", os, "AHB?".cyan());
        }
        let mut name = row.name.clone();
        if row.is_new {
            name = format!("{} {}", name, "(new)".dimmed());
        }
        let cpu = match (row.avg_cpu, row.peak_cpu) {
            (Some(avg), Some(peak)) => format!("{:.1}% / {:.1}%", avg, peak),
            _ => crate::output::color_status(row.utilization_status),
        };

        Self {
            name,
            size: row.size.clone(),
            region: row.region.clone(),
            os,
            total: format_currency(row.total_cost_90d, currency, row.cost_status),
            monthly: format_currency(row.monthly_avg_cost, currency, row.cost_status),
            cpu,
            utilization: color_utilization(row.utilization),
            payg_monthly: format_currency(row.payg_monthly, currency, row.pricing_status),
            savings_1y: format_pct(row.savings_pct_1y),
            savings_3y: format_pct(row.savings_pct_3y),
        }
    }
}

/// Ask for subscription ids on stdin
fn prompt_subscriptions() -> Result<String> {
    print!("Enter subscription ID(s), comma separated: ");
    std::io::stdout().flush().context("Failed to write prompt")?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read subscription IDs")?;
    Ok(line)
}

/// Subscription ids from the flag, the config file, or the prompt
fn resolve_subscriptions(flag: Option<&str>, settings: &Settings) -> Result<Vec<String>> {
    let ids = match flag {
        Some(raw) => parse_subscription_list(raw),
        None if !settings.subscriptions.is_empty() => settings
            .subscriptions
            .iter()
            .flat_map(|s| parse_subscription_list(s))
            .collect(),
        None => parse_subscription_list(&prompt_subscriptions()?),
    };

    if ids.is_empty() {
        anyhow::bail!("No subscription IDs given");
    }
    Ok(ids)
}

/// One status line per subscription event
fn progress_line(progress: &Progress<'_>) -> String {
    match progress {
        Progress::Started {
            subscription_id,
            index,
            total,
        } => format!("[{}/{}] Processing subscription {}", index, total, subscription_id),
        Progress::Completed(report) => {
            let gaps = report.rows_with_gaps();
            if gaps > 0 {
                format!(
                    "{}: {} VM(s), {} with failed or incomplete data",
                    report.subscription_id,
                    report.rows.len(),
                    gaps
                )
            } else {
                format!("{}: {} VM(s)", report.subscription_id, report.rows.len())
            }
        }
        Progress::Failed(failure) => format!("{}: {}", failure.subscription_id, failure.reason),
    }
}

fn print_progress(progress: Progress<'_>) {
    let line = progress_line(&progress);
    match progress {
        Progress::Started { .. } => print_info(&line),
        Progress::Completed(_) => print_success(&line),
        Progress::Failed(_) => print_error(&line),
    }
}

fn print_summary(summary: &RunSummary, paths: &ReportPaths, format: OutputFormat) {
    if let OutputFormat::Json = format {
        print_json(&summary.all_rows());
        return;
    }

    for report in &summary.reports {
        println!();
        println!("{} {}", "Subscription".bold(), report.subscription_id.cyan());
        let rows: Vec<VmRow> = report.rows.iter().map(VmRow::from_row).collect();
        print_table(&rows, format);

        let gaps = report.rows_with_gaps();
        if gaps > 0 {
            print_warning(&format!("{} VM(s) with failed or incomplete data", gaps));
        }
    }

    println!();
    for failure in &summary.failures {
        print_error(&format!("{}: {}", failure.subscription_id, failure.reason));
    }

    if summary.failures.is_empty() {
        print_success(&summary.tally());
    } else {
        print_warning(&summary.tally());
    }
    print_info(&format!("Rows written to {}", paths.rows.display()));
    print_info(&format!("Pricing cache written to {}", paths.pricing.display()));
    print_info(&format!("HTML report written to {}", paths.html.display()));
}

/// Run the full report
pub async fn run_report(settings: &Settings, options: ReportOptions) -> Result<()> {
    let ids = resolve_subscriptions(options.subscriptions.as_deref(), settings)?;
    let output_dir = options
        .output_dir
        .unwrap_or_else(|| settings.output_dir.clone());
    ensure_dir(&output_dir)?;

    debug!(
        subscriptions = ids.len(),
        output_dir = %output_dir.display(),
        "Starting report"
    );
    let credential = CachedToken::new(default_credential(&settings.login_endpoint));
    let arm = ArmClient::new(settings.arm_config(), Box::new(credential))
        .context("Failed to create Resource Manager client")?;
    let prices = RetailPriceClient::new(&settings.pricing_endpoint, settings.request_timeout())?;
    let pipeline = Pipeline::new(arm, Box::new(prices))
        .with_utilization_window(settings.utilization_window_days);

    let paths = ReportPaths::in_dir(&output_dir);
    let mut cache = load_price_cache(&paths.pricing, options.refresh_pricing);

    let started = Utc::now();
    let summary = match options.format {
        // keep stdout a single JSON document
        OutputFormat::Json => pipeline.run(&ids, &mut cache, started).await,
        OutputFormat::Table => {
            pipeline
                .run_with_progress(&ids, &mut cache, started, print_progress)
                .await
        }
    };

    let paths = write_reports(&summary, &cache, &output_dir, started)
        .context("Failed to write report files")?;
    print_summary(&summary, &paths, options.format);

    if summary.succeeded() == 0 {
        anyhow::bail!("No subscription could be processed ({})", summary.tally());
    }
    Ok(())
}
