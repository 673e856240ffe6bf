//! Error text sanitizer.
//!
//! Browser and script errors can carry terminal styling and raw control
//! characters. Everything that ends up in a result record, a log line, or a
//! CSV cell goes through [`sanitize_error`] first.

use regex::Regex;
use std::sync::LazyLock;

static ANSI_CSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-9;?]*[ -/]*[@-~]").unwrap());
static CONTROL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());
static NEWLINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r?\n").unwrap());

/// Strip ANSI escape sequences and control characters, folding line breaks
/// into ` | ` so the message stays on one line. Tabs are kept.
pub fn sanitize_error(input: &str) -> String {
    let cleaned = ANSI_CSI_RE.replace_all(input, "");
    let cleaned = CONTROL_RE.replace_all(&cleaned, "");
    let cleaned = NEWLINE_RE.replace_all(&cleaned, " | ");
    cleaned.trim().to_string()
}
