use std::time::Duration;

use thiserror::Error;

use crate::types::CmpId;

/// Failures reported by a browser driver implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    #[error("element '{selector}' is not visible")]
    NotVisible { selector: String },

    #[error("element '{selector}' is not clickable: {reason}")]
    NotClickable { selector: String, reason: String },

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("frame not found: {selector}")]
    FrameNotFound { selector: String },

    #[error("JavaScript exception: {message}")]
    Script { message: String },

    /// The document the script ran in went away, usually because the page
    /// navigated or reloaded underneath it.
    #[error("execution context lost: {detail}")]
    ContextLost { detail: String },

    #[error("remote debugging protocol error: {detail}")]
    Protocol { detail: String },

    #[error("browser connection closed")]
    Closed,
}

impl DriverError {
    /// Whether this failure only says "this element could not be used right now".
    ///
    /// The consent button resolver moves on to the next candidate for these and
    /// propagates everything else.
    pub fn is_element_unavailable(&self) -> bool {
        matches!(
            self,
            DriverError::Timeout { .. }
                | DriverError::NotVisible { .. }
                | DriverError::NotClickable { .. }
                | DriverError::ElementNotFound { .. }
                | DriverError::FrameNotFound { .. }
                | DriverError::ContextLost { .. }
        )
    }

    pub fn is_context_lost(&self) -> bool {
        matches!(self, DriverError::ContextLost { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}

/// Failures local to a single site visit.
///
/// The orchestrator records every one of these on the site's result and moves
/// on; none of them aborts a run.
#[derive(Debug, Error)]
pub enum ConsentError {
    #[error("navigation failure for {url}: {reason}")]
    NavigationFailure { url: String, reason: String },

    #[error("TCF API ping timeout: no CMP id received within {timeout:?}")]
    ProtocolTimeout { timeout: Duration },

    #[error("consent event timeout: no useractioncomplete event within {timeout:?}")]
    ConsentEventTimeout { timeout: Duration },

    #[error("failed to get vendor consents after consent button click")]
    MissingConsentData,

    #[error("no consent button found with selectors: {}", .selectors.join(" | "))]
    NoConsentControlFound { selectors: Vec<String> },

    #[error("no element with {attribute}=\"{value}\" found in the shadow-pierced DOM")]
    ElementNotFound { attribute: String, value: String },

    #[error("CMP ID {0} not yet supported")]
    UnsupportedCmp(CmpId),

    #[error("{api} API: {reason}")]
    NativeApiFailure { api: String, reason: String },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_control_found_lists_selectors_in_order() {
        let err = ConsentError::NoConsentControlFound {
            selectors: vec!["#btn1".into(), "#btn2".into()],
        };
        assert_eq!(
            err.to_string(),
            "no consent button found with selectors: #btn1 | #btn2"
        );
    }

    #[test]
    fn unsupported_cmp_names_the_id() {
        let err = ConsentError::UnsupportedCmp(999);
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn protocol_timeout_mentions_timeout() {
        let err = ConsentError::ProtocolTimeout {
            timeout: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn element_unavailability_classification() {
        assert!(DriverError::NotVisible { selector: "#a".into() }.is_element_unavailable());
        assert!(DriverError::Timeout {
            operation: "click".into(),
            duration: Duration::from_millis(5),
        }
        .is_element_unavailable());
        assert!(DriverError::ContextLost {
            detail: "Execution context was destroyed.".into(),
        }
        .is_element_unavailable());
        assert!(!DriverError::Closed.is_element_unavailable());
        assert!(!DriverError::Script { message: "SyntaxError".into() }.is_element_unavailable());
    }
}
