//! TCF Protocol Client
//!
//! Talks to the page's `__tcfapi` (TCF v2) and, for CMPs whose consent state
//! is only reachable through their own global, to that global instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use vendorscope_core::{CmpId, ConsentError, ConsentVector, DriverError, Page, PingResponse, Scope};

use crate::poll::{poll_until, PollPolicy};

pub(crate) const DETECT_SCRIPT: &str = "typeof window.__tcfapi === 'function'";

pub(crate) const PING_SCRIPT: &str = r#"new Promise((resolve) => {
  window.__tcfapi('ping', 2, (pingReturn, success) => resolve(success ? pingReturn : null));
})"#;

pub(crate) const CONSENT_EVENT_SCRIPT: &str = r#"new Promise((resolve) => {
  window.__tcfapi('addEventListener', 2, (tcData, success) => {
    if (success && tcData && tcData.eventStatus === 'useractioncomplete') resolve(tcData);
  });
})"#;

/// Listener re-attached after the page reloaded. A decision made before the
/// reload is only visible as stored consent, reported as `tcloaded`.
pub(crate) const STORED_CONSENT_EVENT_SCRIPT: &str = r#"new Promise((resolve) => {
  if (typeof window.__tcfapi !== 'function') return resolve(null);
  window.__tcfapi('addEventListener', 2, (tcData, success) => {
    if (!success || !tcData) return;
    if (tcData.eventStatus === 'useractioncomplete' || tcData.eventStatus === 'tcloaded') resolve(tcData);
  });
})"#;

pub(crate) const GET_TC_DATA_SCRIPT: &str = r#"new Promise((resolve) => {
  window.__tcfapi('getTCData', 2, (tcData, success) => resolve(success ? tcData : null));
})"#;

pub(crate) const DIDOMI_READY_SCRIPT: &str = "typeof window.Didomi !== 'undefined'";

/// Vendor objects are reduced to their IAB id (`namespaces.iab2`), falling
/// back to the Didomi id, so the result is a plain id list.
pub(crate) const DIDOMI_VENDORS_SCRIPT: &str = r#"(() => {
  const vendors = window.Didomi.getRequiredVendors();
  return Array.isArray(vendors)
    ? vendors.map((v) => {
        if (v === null || typeof v !== 'object') return v;
        const iab = v.namespaces ? v.namespaces.iab2 : undefined;
        return iab !== undefined && iab !== null ? iab : v.id;
      })
    : vendors;
})()"#;

/// A way of reading a consent vector without waiting for a TCF event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeProcedure {
    /// `__tcfapi('getTCData', 2, cb)`, reading `vendor.consents`.
    TcfGetTcData,
    /// `Didomi.getRequiredVendors()`.
    DidomiRequiredVendors,
}

impl NativeProcedure {
    /// API name used in `NativeApiFailure` messages.
    pub fn api_name(self) -> &'static str {
        match self {
            Self::TcfGetTcData => "TCF",
            Self::DidomiRequiredVendors => "Didomi",
        }
    }

    pub(crate) fn readiness_script(self) -> &'static str {
        match self {
            Self::TcfGetTcData => DETECT_SCRIPT,
            Self::DidomiRequiredVendors => DIDOMI_READY_SCRIPT,
        }
    }

    fn read_script(self) -> &'static str {
        match self {
            Self::TcfGetTcData => GET_TC_DATA_SCRIPT,
            Self::DidomiRequiredVendors => DIDOMI_VENDORS_SCRIPT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TcfClient {
    poll_interval: Duration,
}

impl TcfClient {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    fn policy(&self, timeout: Duration) -> PollPolicy {
        PollPolicy::new(timeout, self.poll_interval)
    }

    /// Whether `window.__tcfapi` becomes a function within `timeout`.
    ///
    /// Script failures count as "not defined yet". Only a lost browser
    /// connection is an error.
    pub async fn detect_api(&self, page: &dyn Page, timeout: Duration) -> Result<bool, ConsentError> {
        self.wait_for_global(page, DETECT_SCRIPT, timeout).await
    }

    /// Poll until the page's global check script evaluates to `true`.
    pub(crate) async fn wait_for_global(
        &self,
        page: &dyn Page,
        script: &str,
        timeout: Duration,
    ) -> Result<bool, ConsentError> {
        let found = poll_until(self.policy(timeout), |remaining| async move {
            match page.evaluate(&Scope::Document, script, remaining).await {
                Ok(Value::Bool(true)) => Ok(Some(())),
                Ok(_) => Ok(None),
                Err(DriverError::Closed) => Err(ConsentError::Driver(DriverError::Closed)),
                Err(e) => {
                    debug!(error = %e, "Global check failed, retrying");
                    Ok(None)
                }
            }
        })
        .await?;
        Ok(found.is_some())
    }

    /// Ping until the CMP reports a non-zero id.
    pub async fn identify_cmp(&self, page: &dyn Page, timeout: Duration) -> Result<CmpId, ConsentError> {
        let cmp_id = poll_until(self.policy(timeout), |remaining| async move {
            match page.evaluate(&Scope::Document, PING_SCRIPT, remaining).await {
                Ok(value) => Ok(parse_ping(value).and_then(|ping| ping.cmp_id())),
                Err(DriverError::Closed) => Err(ConsentError::Driver(DriverError::Closed)),
                Err(e) => {
                    debug!(error = %e, "Ping failed, retrying");
                    Ok(None)
                }
            }
        })
        .await?;

        cmp_id.ok_or(ConsentError::ProtocolTimeout { timeout })
    }

    /// Wait for the CMP to report a finished user decision and return its
    /// vendor consents.
    ///
    /// Accepting often reloads the page, which kills the listener. The wait
    /// then re-attaches on the new document and also takes the stored
    /// decision, until the same overall `timeout` runs out.
    pub async fn await_consent_decision(
        &self,
        page: &dyn Page,
        timeout: Duration,
    ) -> Result<ConsentVector, ConsentError> {
        let reloaded = AtomicBool::new(false);
        let tc_data = poll_until(self.policy(timeout), |remaining| {
            let reloaded = &reloaded;
            async move {
                let script = if reloaded.load(Ordering::SeqCst) {
                    STORED_CONSENT_EVENT_SCRIPT
                } else {
                    CONSENT_EVENT_SCRIPT
                };
                match page.evaluate(&Scope::Document, script, remaining).await {
                    Ok(Value::Null) => Ok(None),
                    Ok(tc_data) => Ok(Some(tc_data)),
                    Err(e) if e.is_context_lost() => {
                        debug!(error = %e, "Consent listener lost with its document, listening again");
                        reloaded.store(true, Ordering::SeqCst);
                        Ok(None)
                    }
                    Err(DriverError::Timeout { .. }) => Ok(None),
                    Err(e) => Err(ConsentError::from(e)),
                }
            }
        })
        .await?
        .ok_or(ConsentError::ConsentEventTimeout { timeout })?;

        vendor_consents(&tc_data).ok_or(ConsentError::MissingConsentData)
    }

    /// Read the current consent vector with `procedure`.
    pub async fn read_consent_vector(
        &self,
        page: &dyn Page,
        procedure: NativeProcedure,
        timeout: Duration,
    ) -> Result<ConsentVector, ConsentError> {
        let result = page
            .evaluate(&Scope::Document, procedure.read_script(), timeout)
            .await;

        match procedure {
            NativeProcedure::TcfGetTcData => {
                let tc_data = result?;
                vendor_consents(&tc_data).ok_or(ConsentError::MissingConsentData)
            }
            NativeProcedure::DidomiRequiredVendors => {
                let failure = |reason: String| ConsentError::NativeApiFailure {
                    api: procedure.api_name().to_string(),
                    reason,
                };
                let vendors = result.map_err(|e| failure(format!("getRequiredVendors failed: {e}")))?;
                ConsentVector::from_json(&vendors).ok_or_else(|| {
                    failure(format!("getRequiredVendors returned unexpected value: {vendors}"))
                })
            }
        }
    }
}

fn parse_ping(value: Value) -> Option<PingResponse> {
    if value.is_null() {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn vendor_consents(tc_data: &Value) -> Option<ConsentVector> {
    tc_data
        .pointer("/vendor/consents")
        .and_then(ConsentVector::from_json)
}
