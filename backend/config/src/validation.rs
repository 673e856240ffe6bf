//! Config validation: field-path error messages collected in one pass.

use crate::schema::VendorScopeConfig;
use thiserror::Error;

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &VendorScopeConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_target(config, &mut report);
    validate_browser(config, &mut report);
    validate_timeouts(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_target(config: &VendorScopeConfig, report: &mut ValidationReport) {
    match config.vendor_id {
        Some(id) if id <= 0 => {
            report.error("vendorId", "Vendor ID must be a positive integer greater than 0")
        }
        Some(id) if id > i64::from(u32::MAX) => {
            report.error("vendorId", format!("Vendor ID {id} is out of range"))
        }
        Some(_) => {}
        None => report.warn("vendorId", "No vendor ID configured; it must be given on the command line"),
    }

    if let Some(path) = &config.site_list {
        if path.as_os_str().is_empty() {
            report.error("siteList", "Site list path cannot be empty");
        }
    }
}

fn validate_browser(config: &VendorScopeConfig, report: &mut ValidationReport) {
    let Some(browser) = &config.browser else { return };

    if let Some(endpoint) = &browser.ws_endpoint {
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            report.error(
                "browser.wsEndpoint",
                format!("'{endpoint}' is not a ws:// or wss:// URL"),
            );
        }
        if browser.executable.is_some() {
            report.warn(
                "browser.executable",
                "Ignored because browser.wsEndpoint attaches to a running browser",
            );
        }
    }

    if browser.launch_timeout_ms == Some(0) {
        report.error("browser.launchTimeoutMs", "launchTimeoutMs must be > 0");
    }
}

fn validate_timeouts(config: &VendorScopeConfig, report: &mut ValidationReport) {
    let Some(t) = &config.timeouts else { return };

    let fields = [
        ("timeouts.navigationMs", t.navigation_ms),
        ("timeouts.apiDetectMs", t.api_detect_ms),
        ("timeouts.pingMs", t.ping_ms),
        ("timeouts.pollIntervalMs", t.poll_interval_ms),
        ("timeouts.consentClickMs", t.consent_click_ms),
        ("timeouts.consentEventMs", t.consent_event_ms),
        ("timeouts.nativeApiMs", t.native_api_ms),
    ];
    for (path, value) in fields {
        if value == Some(0) {
            report.error(path, "Timeout must be > 0");
        }
    }

    if let (Some(interval), Some(ping)) = (t.poll_interval_ms, t.ping_ms) {
        if interval >= ping {
            report.warn(
                "timeouts.pollIntervalMs",
                format!("Poll interval {interval}ms leaves a single ping within pingMs={ping}"),
            );
        }
    }
}

fn validate_logging(config: &VendorScopeConfig, report: &mut ValidationReport) {
    let Some(level) = config.logging.as_ref().and_then(|l| l.level.as_deref()) else {
        return;
    };
    if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        report.error(
            "logging.level",
            format!("Unknown log level '{level}'. Use one of: {}", LOG_LEVELS.join(", ")),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BrowserConfig, LoggingConfig, TimeoutsConfig};

    #[test]
    fn empty_config_is_valid_with_warning() {
        let report = validate(&VendorScopeConfig::default());
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert_eq!(report.warnings[0].path, "vendorId");
    }

    #[test]
    fn non_positive_vendor_is_error() {
        let cfg = VendorScopeConfig {
            vendor_id: Some(0),
            ..Default::default()
        };
        let report = validate(&cfg);
        assert!(!report.is_valid());
        assert!(report.errors[0].message.contains("positive integer"));
    }

    #[test]
    fn zero_timeout_is_error() {
        let cfg = VendorScopeConfig {
            vendor_id: Some(755),
            timeouts: Some(TimeoutsConfig {
                ping_ms: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = validate(&cfg);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "timeouts.pingMs");
    }

    #[test]
    fn http_ws_endpoint_is_error() {
        let cfg = VendorScopeConfig {
            vendor_id: Some(755),
            browser: Some(BrowserConfig {
                ws_endpoint: Some("http://localhost:9222".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = validate(&cfg);
        assert!(report.errors.iter().any(|e| e.path == "browser.wsEndpoint"));
    }

    #[test]
    fn unknown_log_level_is_error() {
        let cfg = VendorScopeConfig {
            vendor_id: Some(1),
            logging: Some(LoggingConfig {
                level: Some("verbose".into()),
                dir: None,
            }),
            ..Default::default()
        };
        assert!(!validate(&cfg).is_valid());
    }
}
