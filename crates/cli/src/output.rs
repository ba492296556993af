//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};
use vmcost_lib::models::{DataStatus, UtilizationClass};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table, or the items as JSON
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No virtual machines to show".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("Failed to serialize output: {}", e)),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

fn currency_symbol(currency: &str) -> Option<&'static str> {
    match currency {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        _ => None,
    }
}

/// Format an amount, or the reason it is missing
pub fn format_currency(amount: Option<f64>, currency: &str, status: DataStatus) -> String {
    match amount {
        Some(amount) => {
            let formatted = match currency_symbol(currency) {
                Some(symbol) => format!("{}{:.2}", symbol, amount),
                None => format!("{:.2} {}", amount, currency),
            };
            if status == DataStatus::Partial {
                format!("{}*", formatted)
            } else {
                formatted
            }
        }
        None => color_status(status),
    }
}

/// Format an hourly rate with four decimals
pub fn format_rate(rate: Option<f64>, currency: &str) -> String {
    match rate {
        Some(rate) => match currency_symbol(currency) {
            Some(symbol) => format!("{}{:.4}", symbol, rate),
            None => format!("{:.4} {}", rate, currency),
        },
        None => "-".dimmed().to_string(),
    }
}

/// Format a savings percentage
pub fn format_pct(pct: Option<f64>) -> String {
    match pct {
        Some(p) if p > 0.0 => format!("{:.1}%", p).green().to_string(),
        Some(p) => format!("{:.1}%", p),
        None => "-".dimmed().to_string(),
    }
}

/// Color a missing-data marker
pub fn color_status(status: DataStatus) -> String {
    let label = status.to_string();
    match status {
        DataStatus::Ok => label.green().to_string(),
        DataStatus::Partial => label.yellow().to_string(),
        DataStatus::NoData => label.dimmed().to_string(),
        DataStatus::Failed => label.red().to_string(),
    }
}

/// Color a utilization class
pub fn color_utilization(class: UtilizationClass) -> String {
    let label = class.label();
    match class {
        UtilizationClass::VeryLow => label.red().to_string(),
        UtilizationClass::Low => label.yellow().to_string(),
        UtilizationClass::Normal => label.green().to_string(),
        UtilizationClass::High => label.magenta().to_string(),
        UtilizationClass::NoData => label.dimmed().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_currency() {
        colored::control::set_override(false);
        assert_eq!(format_currency(Some(100.0), "USD", DataStatus::Ok), "$100.00");
        assert_eq!(format_currency(Some(12.5), "CHF", DataStatus::Ok), "12.50 CHF");
        assert_eq!(format_currency(Some(1.0), "EUR", DataStatus::Partial), "€1.00*");
        assert_eq!(format_currency(None, "USD", DataStatus::Failed), "failed");
        assert_eq!(format_currency(None, "USD", DataStatus::NoData), "no data");
    }

    #[test]
    fn test_format_rate_and_pct() {
        colored::control::set_override(false);
        assert_eq!(format_rate(Some(0.096), "USD"), "$0.0960");
        assert_eq!(format_rate(None, "USD"), "-");
        assert_eq!(format_pct(Some(30.0)), "30.0%");
        assert_eq!(format_pct(None), "-");
    }
}
