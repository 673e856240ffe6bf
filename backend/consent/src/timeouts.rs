use std::time::Duration;

/// Budgets for every suspending step of a site visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Until DOMContentLoaded.
    pub navigation: Duration,
    /// Waiting for `__tcfapi` to be defined.
    pub api_detect: Duration,
    /// Waiting for a ping with a CMP id.
    pub ping: Duration,
    pub poll_interval: Duration,
    /// Per consent button: visibility wait, then the click.
    pub consent_click: Duration,
    /// Waiting for `useractioncomplete`, and for native consent reads.
    pub consent_event: Duration,
    /// Waiting for a CMP's own global object.
    pub native_api: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            api_detect: Duration::from_secs(10),
            ping: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            consent_click: Duration::from_secs(30),
            consent_event: Duration::from_secs(10),
            native_api: Duration::from_secs(60),
        }
    }
}
