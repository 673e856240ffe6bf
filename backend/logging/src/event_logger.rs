//! Site Event Logger
//!
//! Structured per-site lifecycle events (visiting, CMP identified, outcome,
//! failure) emitted on the `site_events` target so they land in the NDJSON log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::sanitize::sanitize_error;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SiteEvent {
    Visiting {
        site: String,
        vendor_id: u32,
    },
    CmpIdentified {
        site: String,
        cmp_id: u32,
    },
    Outcome {
        site: String,
        has_tcf: Option<bool>,
        cmp_id: Option<u32>,
        vendor_is_present: Option<bool>,
    },
    Failure {
        site: String,
        stage: String,
        error_msg: String,
    },
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: SiteEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Log a site event for the given run. Failure text is sanitized first.
    pub fn log_event(run_id: &str, mut event: SiteEvent) {
        if let SiteEvent::Failure { error_msg, .. } = &mut event {
            *error_msg = sanitize_error(error_msg);
        }

        let is_failure = matches!(event, SiteEvent::Failure { .. });
        let entry = EventLogEntry {
            run_id: run_id.into(),
            timestamp: Utc::now(),
            event,
        };
        let payload = serde_json::to_string(&entry).unwrap_or_default();

        if is_failure {
            warn!(target: "site_events", event = %payload, "Site event");
        } else {
            info!(target: "site_events", event = %payload, "Site event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_with_tagged_event() {
        let entry = EventLogEntry {
            run_id: "run-1".into(),
            timestamp: Utc::now(),
            event: SiteEvent::CmpIdentified {
                site: "https://example.com".into(),
                cmp_id: 300,
            },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"]["type"], "cmp_identified");
        assert_eq!(json["event"]["cmp_id"], 300);
    }

    #[test]
    fn outcome_keeps_unknown_as_null() {
        let event = SiteEvent::Outcome {
            site: "https://example.com".into(),
            has_tcf: Some(true),
            cmp_id: None,
            vendor_is_present: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json["vendor_is_present"].is_null());
        assert_eq!(json["has_tcf"], true);
    }
}
