//! CSV export of a validation run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use vendorscope_core::{SiteValidationResult, ValidationRun, VendorId};
use vendorscope_logging::sanitize_error;

const HEADER: [&str; 7] = [
    "Site",
    "Vendor ID",
    "Has TCF",
    "CMP ID",
    "Vendor Found",
    "Timestamp",
    "Error",
];
const NOT_AVAILABLE: &str = "N/A";

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |v| v.to_string())
}

fn row(result: &SiteValidationResult) -> [String; 7] {
    [
        result.site.clone(),
        result.vendor_id.to_string(),
        opt(result.has_tcf),
        opt(result.cmp_id),
        opt(result.vendor_is_present),
        iso(result.timestamp),
        opt(result.error.as_deref().map(sanitize_error)),
    ]
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Render results as `;`-separated, fully quoted CSV with a header row.
pub fn render_csv(results: &[SiteValidationResult]) -> String {
    let header = HEADER.map(String::from);
    std::iter::once(header)
        .chain(results.iter().map(row))
        .map(|fields| fields.iter().map(|f| quote(f)).collect::<Vec<_>>().join(";"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `validation-<vendor>-<timestamp>.csv`, with `:` and `.` in the timestamp
/// replaced so the name is portable.
pub fn csv_file_name(vendor_id: VendorId, at: DateTime<Utc>) -> String {
    let stamp = iso(at).replace([':', '.'], "-");
    format!("validation-{vendor_id}-{stamp}.csv")
}

/// Write the run's CSV into `dir`, creating it if needed.
pub async fn write_csv(dir: &Path, run: &ValidationRun) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create results directory: {}", dir.display()))?;

    let path = dir.join(csv_file_name(
        run.vendor_id,
        run.finished_at.unwrap_or_else(Utc::now),
    ));
    tokio::fs::write(&path, render_csv(run.results()))
        .await
        .with_context(|| format!("Failed to write results: {}", path.display()))?;
    Ok(path)
}
