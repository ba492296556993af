//! Report artifacts written at the end of a run
//!
//! - `output.json`: every aggregated row across all subscriptions
//! - `pricing_data.json`: the price cache (see [`crate::pricing::PriceCache::save`])
//! - `vm_cost_report.html`: self-contained HTML report

mod html;

pub use html::{render_html, write_html};

use crate::error::ReportError;
use crate::models::AggregatedVmRow;
use crate::pipeline::RunSummary;
use crate::pricing::PriceCache;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub const ROWS_FILE: &str = "output.json";
pub const PRICING_FILE: &str = "pricing_data.json";
pub const HTML_FILE: &str = "vm_cost_report.html";

/// Paths of the files written by [`write_reports`]
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub rows: PathBuf,
    pub pricing: PathBuf,
    pub html: PathBuf,
}

impl ReportPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            rows: dir.join(ROWS_FILE),
            pricing: dir.join(PRICING_FILE),
            html: dir.join(HTML_FILE),
        }
    }
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), ReportError> {
    std::fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Write the rows as a pretty-printed JSON array
pub fn write_rows_json(rows: &[&AggregatedVmRow], path: &Path) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(rows)?;
    write_file(path, &json)
}

/// Write all three artifacts into `dir`
pub fn write_reports(
    summary: &RunSummary,
    cache: &PriceCache,
    dir: &Path,
    generated_at: DateTime<Utc>,
) -> Result<ReportPaths, ReportError> {
    std::fs::create_dir_all(dir).map_err(|source| ReportError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let paths = ReportPaths::in_dir(dir);
    write_rows_json(&summary.all_rows(), &paths.rows)?;
    cache.save(&paths.pricing)?;
    write_html(summary, generated_at, &paths.html)?;
    Ok(paths)
}
