//! Self-contained HTML report

use super::write_file;
use crate::error::ReportError;
use crate::models::{AggregatedVmRow, DataStatus, UtilizationClass};
use crate::pipeline::{RunSummary, SubscriptionReport};
use chrono::{DateTime, Utc};
use std::path::Path;

const STYLE: &str = r#"
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; color: #1f2937; background: #f3f4f6; margin: 0; padding: 20px; }
.container { max-width: 1600px; margin: 0 auto; }
.header { background: linear-gradient(135deg, #0078d4, #005a9e); color: white; padding: 1.5rem 2rem; border-radius: 8px; margin-bottom: 1.5rem; }
.section { background: white; padding: 1.5rem; margin-bottom: 1.5rem; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); overflow-x: auto; }
.cards { display: flex; flex-wrap: wrap; gap: 1rem; margin-bottom: 1rem; }
.card { flex: 1 1 160px; background: #f9fafb; border: 1px solid #e5e7eb; border-radius: 6px; padding: 0.75rem 1rem; }
.card .label { font-size: 0.8rem; color: #6b7280; text-transform: uppercase; }
.card .value { font-size: 1.4rem; font-weight: 600; }
table { width: 100%; border-collapse: collapse; font-size: 0.85rem; }
th, td { padding: 0.5rem; text-align: left; border-bottom: 1px solid #e5e7eb; white-space: nowrap; }
th { background: #f9fafb; font-weight: 600; position: sticky; top: 0; }
th.sortable { cursor: pointer; }
th.sortable:hover { background: #e5e7eb; }
td.num { text-align: right; font-variant-numeric: tabular-nums; }
.missing { color: #9ca3af; font-style: italic; }
.failed { color: #dc2626; font-style: italic; }
.partial { color: #d97706; }
.badge { display: inline-block; padding: 0.1rem 0.5rem; border-radius: 4px; font-size: 0.75rem; font-weight: 600; color: white; }
.badge-very-low { background: #dc2626; }
.badge-low { background: #f59e0b; }
.badge-normal { background: #10b981; }
.badge-high { background: #7c3aed; }
.badge-no-data { background: #9ca3af; }
.flag { color: #0078d4; font-weight: 600; }
.errors li { margin-bottom: 0.4rem; }
"#;

const SCRIPT: &str = r#"
document.querySelectorAll('table.vm-table').forEach(function (table) {
  table.querySelectorAll('th.sortable').forEach(function (th, col) {
    th.addEventListener('click', function () {
      var body = table.tBodies[0];
      var rows = Array.from(body.rows);
      var asc = th.dataset.order !== 'asc';
      table.querySelectorAll('th.sortable').forEach(function (h) { delete h.dataset.order; });
      th.dataset.order = asc ? 'asc' : 'desc';
      rows.sort(function (a, b) {
        var x = a.cells[col].dataset.value, y = b.cells[col].dataset.value;
        var nx = parseFloat(x), ny = parseFloat(y);
        var cmp;
        if (x === '' && y === '') cmp = 0;
        else if (x === '') cmp = 1;
        else if (y === '') cmp = -1;
        else if (!isNaN(nx) && !isNaN(ny)) cmp = nx - ny;
        else cmp = x.localeCompare(y);
        return asc ? cmp : -cmp;
      });
      rows.forEach(function (r) { body.appendChild(r); });
    });
  });
});
"#;

/// Escape text for HTML element content and attribute values
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn marker(status: DataStatus) -> String {
    match status {
        DataStatus::Failed => r#"<span class="failed">failed</span>"#.to_string(),
        _ => r#"<span class="missing">no data</span>"#.to_string(),
    }
}

/// Numeric cell; empty values render the status marker and sort last
fn num_cell(value: Option<f64>, decimals: usize, status: DataStatus) -> String {
    match value {
        Some(v) => {
            let partial = if status == DataStatus::Partial {
                r#" <span class="partial" title="some cost data could not be read">*</span>"#
            } else {
                ""
            };
            format!(
                r#"<td class="num" data-value="{v}">{v:.prec$}{partial}</td>"#,
                v = v,
                prec = decimals,
                partial = partial
            )
        }
        None => format!(r#"<td class="num" data-value="">{}</td>"#, marker(status)),
    }
}

fn pct_cell(value: Option<f64>, status: DataStatus) -> String {
    match value {
        Some(v) => format!(r#"<td class="num" data-value="{v}">{v:.1}%</td>"#, v = v),
        None => format!(r#"<td class="num" data-value="">{}</td>"#, marker(status)),
    }
}

fn text_cell(text: &str) -> String {
    let escaped = escape(text);
    format!(r#"<td data-value="{0}">{0}</td>"#, escaped)
}

fn badge(class: UtilizationClass) -> String {
    format!(
        r#"<td data-value="{label}" title="{advice}"><span class="badge badge-{css}">{label}</span></td>"#,
        label = class.label(),
        advice = class.advice(),
        css = class.label().replace(' ', "-")
    )
}

fn card(label: &str, value: &str) -> String {
    format!(
        r#"<div class="card"><div class="label">{}</div><div class="value">{}</div></div>"#,
        label, value
    )
}

const COLUMNS: &[&str] = &[
    "VM",
    "Resource group",
    "Region",
    "Size",
    "OS",
    "License",
    "New",
    "90-day cost",
    "Monthly avg",
    "Yearly proj.",
    "3-year proj.",
    "Avg CPU %",
    "Peak CPU %",
    "Utilization",
    "PAYG/hour",
    "PAYG/month",
    "PAYG/year",
    "1-yr RI/year",
    "3-yr RI/year",
    "1-yr savings",
    "3-yr savings",
    "Spot/month",
    "Low priority/month",
];

fn render_row(row: &AggregatedVmRow) -> String {
    let mut cells = String::new();
    let license = if row.payg_license_flag {
        format!(
            r#"<td data-value="{0}"><span class="flag" title="Windows without Hybrid Benefit">{0}</span></td>"#,
            row.license
        )
    } else {
        text_cell(&row.license.to_string())
    };

    cells.push_str(&text_cell(&row.name));
    cells.push_str(&text_cell(&row.resource_group));
    cells.push_str(&text_cell(&row.region));
    cells.push_str(&text_cell(&row.size));
    cells.push_str(&text_cell(&row.os.to_string()));
    cells.push_str(&license);
    cells.push_str(&text_cell(if row.is_new { "yes" } else { "" }));

    cells.push_str(&num_cell(row.total_cost_90d, 2, row.cost_status));
    cells.push_str(&num_cell(row.monthly_avg_cost, 2, row.cost_status));
    cells.push_str(&num_cell(row.yearly_projection, 2, row.cost_status));
    cells.push_str(&num_cell(row.three_year_projection, 2, row.cost_status));

    cells.push_str(&num_cell(row.avg_cpu, 1, row.utilization_status));
    cells.push_str(&num_cell(row.peak_cpu, 1, row.utilization_status));
    cells.push_str(&badge(row.utilization));

    let p = row.pricing_status;
    cells.push_str(&num_cell(row.payg_hourly, 4, p));
    cells.push_str(&num_cell(row.payg_monthly, 2, p));
    cells.push_str(&num_cell(row.payg_yearly, 2, p));
    cells.push_str(&num_cell(row.ri1y_yearly, 2, p));
    cells.push_str(&num_cell(row.ri3y_yearly, 2, p));
    cells.push_str(&pct_cell(row.savings_pct_1y, p));
    cells.push_str(&pct_cell(row.savings_pct_3y, p));
    cells.push_str(&num_cell(row.spot_monthly, 2, p));
    cells.push_str(&num_cell(row.low_priority_monthly, 2, p));

    format!("<tr>{}</tr>", cells)
}

fn render_subscription(report: &SubscriptionReport) -> String {
    let rows = &report.rows;
    let currency = rows
        .iter()
        .find_map(|r| r.currency.as_deref())
        .unwrap_or("USD");
    let cost_gaps = rows
        .iter()
        .filter(|r| r.total_cost_90d.is_none() || r.cost_status == DataStatus::Partial)
        .count();
    let total: f64 = rows.iter().filter_map(|r| r.total_cost_90d).sum();
    let monthly: f64 = rows.iter().filter_map(|r| r.monthly_avg_cost).sum();
    let gap_note = if cost_gaps > 0 {
        format!(r#" <span class="missing">({} without full data)</span>"#, cost_gaps)
    } else {
        String::new()
    };

    let mut cards = String::new();
    cards.push_str(&card("Virtual machines", &rows.len().to_string()));
    cards.push_str(&card(
        "90-day actual cost",
        &format!("{:.2} {}{}", total, escape(currency), gap_note),
    ));
    cards.push_str(&card(
        "Average monthly",
        &format!("{:.2} {}", monthly, escape(currency)),
    ));
    cards.push_str(&card(
        "New VMs",
        &rows.iter().filter(|r| r.is_new).count().to_string(),
    ));
    cards.push_str(&card(
        "Hybrid Benefit candidates",
        &rows.iter().filter(|r| r.payg_license_flag).count().to_string(),
    ));

    let header: String = COLUMNS
        .iter()
        .map(|c| format!(r#"<th class="sortable">{}</th>"#, c))
        .collect();
    let body: String = rows.iter().map(render_row).collect();

    format!(
        r#"<div class="section">
    <h2>Subscription {id}</h2>
    <div class="cards">{cards}</div>
    <table class="vm-table">
        <thead><tr>{header}</tr></thead>
        <tbody>{body}</tbody>
    </table>
</div>"#,
        id = escape(&report.subscription_id),
        cards = cards,
        header = header,
        body = body
    )
}

fn render_failures(summary: &RunSummary) -> String {
    if summary.failures.is_empty() {
        return String::new();
    }
    let items: String = summary
        .failures
        .iter()
        .map(|failure| {
            format!(
                "<li><strong>{}</strong>: {}</li>",
                escape(&failure.subscription_id),
                escape(&failure.reason)
            )
        })
        .collect();
    format!(
        r#"<div class="section">
    <h2>Failed subscriptions</h2>
    <ul class="errors">{}</ul>
</div>"#,
        items
    )
}

/// Render the full report page
pub fn render_html(summary: &RunSummary, generated_at: DateTime<Utc>) -> String {
    let sections: String = summary.reports.iter().map(render_subscription).collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Azure VM Cost Report</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>Azure VM Cost Report</h1>
            <p>Generated on {generated}</p>
            <p>{tally}</p>
        </div>
        {sections}
        {failures}
    </div>
    <script>{script}</script>
</body>
</html>
"#,
        style = STYLE,
        generated = generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        tally = escape(&summary.tally()),
        sections = sections,
        failures = render_failures(summary),
        script = SCRIPT
    )
}

/// Render and write the report page
pub fn write_html(summary: &RunSummary, generated_at: DateTime<Utc>, path: &Path) -> Result<(), ReportError> {
    write_file(path, &render_html(summary, generated_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SubscriptionFailure;
    use crate::report::tests::sample_row;
    use chrono::TimeZone;

    fn summary() -> RunSummary {
        let mut flagged = sample_row("win<script>");
        flagged.payg_license_flag = true;
        flagged.cost_status = DataStatus::Ok;
        flagged.total_cost_90d = Some(300.0);
        flagged.monthly_avg_cost = Some(100.0);
        flagged.currency = Some("EUR".into());

        RunSummary {
            reports: vec![SubscriptionReport {
                subscription_id: "sub-1".into(),
                rows: vec![flagged, sample_row("vm2")],
            }],
            failures: vec![SubscriptionFailure {
                subscription_id: "sub-2".into(),
                reason: "No virtual machines found in subscription sub-2".into(),
            }],
        }
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_render_escapes_vm_names() {
        let html = render_html(&summary(), generated_at());
        assert!(html.contains("win&lt;script&gt;"));
        assert!(!html.contains("win<script>"));
    }

    #[test]
    fn test_render_marks_missing_data() {
        let html = render_html(&summary(), generated_at());
        assert!(html.contains(r#"<span class="failed">failed</span>"#));
        assert!(html.contains(r#"<span class="missing">no data</span>"#));
        assert!(html.contains("badge-no-data"));
    }

    #[test]
    fn test_render_summary_cards_and_failures() {
        let html = render_html(&summary(), generated_at());
        assert!(html.contains("300.00 EUR"));
        assert!(html.contains("(1 without full data)"));
        assert!(html.contains("Hybrid Benefit candidates"));
        assert!(html.contains("Failed subscriptions"));
        assert!(html.contains("1 of 2 subscriptions succeeded"));
        assert!(html.contains("Generated on 2025-06-01 08:30:00 UTC"));
    }

    #[test]
    fn test_render_sortable_table() {
        let html = render_html(&summary(), generated_at());
        assert_eq!(html.matches(r#"<th class="sortable">"#).count(), COLUMNS.len());
        assert!(html.contains(r#"data-value="0.096""#));
        assert!(html.contains("addEventListener('click'"));
    }

    #[test]
    fn test_render_failures_lists_each_subscription() {
        let mut summary = summary();
        summary.failures.push(SubscriptionFailure {
            subscription_id: "sub-3".into(),
            reason: "Access denied (403): <forbidden>".into(),
        });
        let list = render_failures(&summary);

        assert_eq!(list.matches("<li>").count(), 2);
        assert!(list.contains(
            "<li><strong>sub-2</strong>: No virtual machines found in subscription sub-2</li>"
        ));
        assert!(list.contains("<li><strong>sub-3</strong>: Access denied (403): &lt;forbidden&gt;</li>"));
    }

    #[test]
    fn test_no_failures_section_when_all_succeed() {
        let mut summary = summary();
        summary.failures.clear();
        assert!(!render_html(&summary, generated_at()).contains("Failed subscriptions"));
    }
}
