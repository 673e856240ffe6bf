//! Config defaults: fills every unset field after loading.

use crate::schema::{
    BrowserConfig, LoggingConfig, OutputConfig, TimeoutsConfig, VendorScopeConfig,
};

pub const DEFAULT_HEADLESS: bool = true;
pub const DEFAULT_LAUNCH_TIMEOUT_MS: u64 = 20_000;

pub const DEFAULT_NAVIGATION_MS: u64 = 30_000;
pub const DEFAULT_API_DETECT_MS: u64 = 10_000;
pub const DEFAULT_PING_MS: u64 = 10_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_CONSENT_CLICK_MS: u64 = 30_000;
pub const DEFAULT_CONSENT_EVENT_MS: u64 = 10_000;
/// Third-party CMP globals are injected late, so their wait is much longer.
pub const DEFAULT_NATIVE_API_MS: u64 = 60_000;

pub const DEFAULT_RESULTS_DIR: &str = "results";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: VendorScopeConfig) -> VendorScopeConfig {
    let config = apply_browser_defaults(config);
    let config = apply_timeout_defaults(config);
    let config = apply_output_defaults(config);
    apply_logging_defaults(config)
}

fn apply_browser_defaults(mut config: VendorScopeConfig) -> VendorScopeConfig {
    config.headless.get_or_insert(DEFAULT_HEADLESS);
    let browser = config.browser.get_or_insert_with(BrowserConfig::default);
    browser.launch_timeout_ms.get_or_insert(DEFAULT_LAUNCH_TIMEOUT_MS);
    config
}

fn apply_timeout_defaults(mut config: VendorScopeConfig) -> VendorScopeConfig {
    let t = config.timeouts.get_or_insert_with(TimeoutsConfig::default);
    t.navigation_ms.get_or_insert(DEFAULT_NAVIGATION_MS);
    t.api_detect_ms.get_or_insert(DEFAULT_API_DETECT_MS);
    t.ping_ms.get_or_insert(DEFAULT_PING_MS);
    t.poll_interval_ms.get_or_insert(DEFAULT_POLL_INTERVAL_MS);
    t.consent_click_ms.get_or_insert(DEFAULT_CONSENT_CLICK_MS);
    t.consent_event_ms.get_or_insert(DEFAULT_CONSENT_EVENT_MS);
    t.native_api_ms.get_or_insert(DEFAULT_NATIVE_API_MS);
    config
}

fn apply_output_defaults(mut config: VendorScopeConfig) -> VendorScopeConfig {
    let output = config.output.get_or_insert_with(OutputConfig::default);
    output
        .results_dir
        .get_or_insert_with(|| DEFAULT_RESULTS_DIR.into());
    config
}

fn apply_logging_defaults(mut config: VendorScopeConfig) -> VendorScopeConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging
        .level
        .get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    logging.dir.get_or_insert_with(|| DEFAULT_LOG_DIR.into());
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_empty_config() {
        let cfg = apply_all_defaults(VendorScopeConfig::default());
        assert_eq!(cfg.headless, Some(true));
        let t = cfg.timeouts.unwrap();
        assert_eq!(t.ping_ms, Some(DEFAULT_PING_MS));
        assert_eq!(t.native_api_ms, Some(60_000));
        assert_eq!(cfg.logging.unwrap().level.as_deref(), Some("info"));
    }

    #[test]
    fn keeps_explicit_values() {
        let mut cfg = VendorScopeConfig::default();
        cfg.headless = Some(false);
        cfg.timeouts = Some(TimeoutsConfig {
            ping_ms: Some(2_000),
            ..Default::default()
        });
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.headless, Some(false));
        let t = cfg.timeouts.unwrap();
        assert_eq!(t.ping_ms, Some(2_000));
        assert_eq!(t.navigation_ms, Some(DEFAULT_NAVIGATION_MS));
    }
}
