use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use vendorscope_browser::LaunchOptions;
use vendorscope_config::defaults::*;
use vendorscope_config::VendorScopeConfig;
use vendorscope_consent::Timeouts;
use vendorscope_core::VendorId;

/// Values given on the command line. Each one wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub vendor_id: Option<String>,
    pub site_list: Option<PathBuf>,
    pub headfull: bool,
    pub results_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub ws_endpoint: Option<String>,
}

/// Where the browser comes from.
#[derive(Debug, Clone)]
pub enum BrowserTarget {
    Launch(LaunchOptions),
    Attach(String),
}

/// Everything a run needs, resolved from config file and flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub vendor_id: VendorId,
    pub site_list: PathBuf,
    pub headless: bool,
    pub browser: BrowserTarget,
    pub timeouts: Timeouts,
    pub results_dir: PathBuf,
    pub log_level: String,
    pub log_dir: PathBuf,
}

impl Config {
    /// Merge flags over a prepared file config. Relative paths from the file
    /// resolve against `config_dir`; relative paths from flags stay relative
    /// to the working directory.
    pub fn resolve(
        overrides: &CliOverrides,
        file: VendorScopeConfig,
        config_dir: &Path,
    ) -> Result<Self> {
        let vendor_id = match (&overrides.vendor_id, file.vendor_id) {
            (Some(raw), _) => parse_vendor_id(raw)?,
            (None, Some(id)) => VendorId::try_from(id)
                .ok()
                .filter(|id| *id > 0)
                .context("Vendor ID must be a positive integer greater than 0.")?,
            (None, None) => bail!("No vendor ID given. Pass it as the first argument or set vendorId in the config file."),
        };

        let site_list = match (&overrides.site_list, file.site_list) {
            (Some(path), _) => path.clone(),
            (None, Some(path)) => config_dir.join(path),
            (None, None) => bail!("No site list given. Pass --site-list or set siteList in the config file."),
        };

        let headless = !overrides.headfull && file.headless.unwrap_or(DEFAULT_HEADLESS);

        let browser_cfg = file.browser.unwrap_or_default();
        let browser = match overrides.ws_endpoint.clone().or(browser_cfg.ws_endpoint) {
            Some(endpoint) => BrowserTarget::Attach(endpoint),
            None => BrowserTarget::Launch(LaunchOptions {
                executable: browser_cfg.executable.map(|p| config_dir.join(p)),
                headless,
                extra_args: browser_cfg.extra_args,
                launch_timeout: ms(browser_cfg.launch_timeout_ms, DEFAULT_LAUNCH_TIMEOUT_MS),
            }),
        };

        let t = file.timeouts.unwrap_or_default();
        let timeouts = Timeouts {
            navigation: ms(t.navigation_ms, DEFAULT_NAVIGATION_MS),
            api_detect: ms(t.api_detect_ms, DEFAULT_API_DETECT_MS),
            ping: ms(t.ping_ms, DEFAULT_PING_MS),
            poll_interval: ms(t.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS),
            consent_click: ms(t.consent_click_ms, DEFAULT_CONSENT_CLICK_MS),
            consent_event: ms(t.consent_event_ms, DEFAULT_CONSENT_EVENT_MS),
            native_api: ms(t.native_api_ms, DEFAULT_NATIVE_API_MS),
        };

        let results_dir = match (&overrides.results_dir, file.output.and_then(|o| o.results_dir)) {
            (Some(dir), _) => dir.clone(),
            (None, Some(dir)) => config_dir.join(dir),
            (None, None) => PathBuf::from(DEFAULT_RESULTS_DIR),
        };

        let logging = file.logging.unwrap_or_default();
        let log_level = overrides
            .log_level
            .clone()
            .or(logging.level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let log_dir = logging
            .dir
            .map(|d| config_dir.join(d))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

        Ok(Self {
            vendor_id,
            site_list,
            headless,
            browser,
            timeouts,
            results_dir,
            log_level,
            log_dir,
        })
    }
}

/// Parse a vendor id argument; only positive integers are accepted.
pub fn parse_vendor_id(raw: &str) -> Result<VendorId> {
    match raw.trim().parse::<VendorId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => bail!("Vendor ID must be a positive integer greater than 0 (got '{raw}')."),
    }
}

fn ms(value: Option<u64>, default: u64) -> Duration {
    Duration::from_millis(value.unwrap_or(default))
}
