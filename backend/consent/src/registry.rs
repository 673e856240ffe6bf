//! CMP Strategy Registry
//!
//! The closed table of supported CMPs and how to obtain a consent decision
//! from each. Anything not listed fails with `UnsupportedCmp`.

use tracing::{debug, info};
use vendorscope_core::{CmpId, ConsentError, ConsentVector, Page, Scope, VendorId};

use crate::poll::{poll_until, PollPolicy};
use crate::resolver::resolve_and_click;
use crate::tcf::{NativeProcedure, TcfClient};
use crate::timeouts::Timeouts;

/// How to get a consent decision out of one CMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpStrategy {
    /// Click the first usable selector, then wait for the TCF decision event.
    ClickAndVerify {
        selectors: &'static [&'static str],
        /// CSS selector of the iframe holding the buttons.
        frame: Option<&'static str>,
    },
    /// Click a node found by attribute in the shadow-pierced DOM, bypassing
    /// visibility checks, then wait for the TCF decision event.
    ShadowPierceClickAndVerify {
        attribute: &'static str,
        value: &'static str,
    },
    /// Ask the CMP's own API. No click.
    NativeApiCheck { procedure: NativeProcedure },
}

const fn click(selector: &'static [&'static str]) -> CmpStrategy {
    CmpStrategy::ClickAndVerify {
        selectors: selector,
        frame: None,
    }
}

pub const REGISTRY: &[(CmpId, CmpStrategy)] = &[
    // Usercentrics
    (
        5,
        CmpStrategy::ShadowPierceClickAndVerify {
            attribute: "data-testid",
            value: "uc-accept-all-button",
        },
    ),
    // Sourcepoint
    (
        6,
        CmpStrategy::ClickAndVerify {
            selectors: &[".sp_choice_type_11"],
            frame: Some(r#"[id^="sp_message_iframe"]"#),
        },
    ),
    // Didomi
    (
        7,
        CmpStrategy::NativeApiCheck {
            procedure: NativeProcedure::DidomiRequiredVendors,
        },
    ),
    // Quantcast
    (10, click(&[".qc-cmp2-summary-buttons button[mode=primary]"])),
    // OneTrust
    (28, click(&["#onetrust-accept-btn-handler"])),
    // consentmanager
    (31, click(&[".cmptxt_btn_yes"])),
    // Unic
    (68, click(&[".unic-modal-content button:nth-of-type(2)"])),
    // Google Funding Choices
    (300, click(&[".fc-cta-consent"])),
    // Cookie Script
    (374, click(&["#cookiescript_accept"])),
    // CookieYes
    (401, click(&[".cky-notice-btn-wrapper .cky-btn-accept"])),
];

/// The strategy registered for `cmp_id`.
pub fn lookup(cmp_id: CmpId) -> Result<CmpStrategy, ConsentError> {
    REGISTRY
        .iter()
        .find(|(id, _)| *id == cmp_id)
        .map(|(_, strategy)| *strategy)
        .ok_or(ConsentError::UnsupportedCmp(cmp_id))
}

pub fn supported_cmp_ids() -> impl Iterator<Item = CmpId> {
    REGISTRY.iter().map(|(id, _)| *id)
}

/// Executes strategies against a page.
#[derive(Debug, Clone, Copy)]
pub struct StrategyRunner {
    tcf: TcfClient,
    timeouts: Timeouts,
}

impl StrategyRunner {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            tcf: TcfClient::new(timeouts.poll_interval),
            timeouts,
        }
    }

    /// Look up `cmp_id`, record a consent decision and report whether
    /// `vendor_id` is in the resulting consent set.
    pub async fn dispatch(
        &self,
        cmp_id: CmpId,
        page: &dyn Page,
        vendor_id: VendorId,
    ) -> Result<bool, ConsentError> {
        let strategy = lookup(cmp_id)?;
        self.accept(strategy, page).await?;
        self.verify(strategy, page, vendor_id).await
    }

    /// Perform the UI side of `strategy`: click the consent control, or wait
    /// for the native API to appear.
    pub async fn accept(&self, strategy: CmpStrategy, page: &dyn Page) -> Result<(), ConsentError> {
        match strategy {
            CmpStrategy::ClickAndVerify { selectors, frame } => {
                let scope = frame.map_or(Scope::Document, |f| Scope::Frame(f.to_string()));
                let clicked =
                    resolve_and_click(page, selectors, &scope, self.timeouts.consent_click).await?;
                info!(selector = clicked, scope = %scope, "Consent button clicked");
                Ok(())
            }
            CmpStrategy::ShadowPierceClickAndVerify { attribute, value } => {
                self.pierce_and_click(page, attribute, value).await
            }
            CmpStrategy::NativeApiCheck { procedure } => {
                let ready = self
                    .tcf
                    .wait_for_global(page, procedure.readiness_script(), self.timeouts.native_api)
                    .await?;
                if !ready {
                    return Err(ConsentError::NativeApiFailure {
                        api: procedure.api_name().to_string(),
                        reason: "time out waiting for API".to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Read the consent set `strategy` produces and test membership.
    pub async fn verify(
        &self,
        strategy: CmpStrategy,
        page: &dyn Page,
        vendor_id: VendorId,
    ) -> Result<bool, ConsentError> {
        let vector: ConsentVector = match strategy {
            CmpStrategy::ClickAndVerify { .. } | CmpStrategy::ShadowPierceClickAndVerify { .. } => {
                self.tcf
                    .await_consent_decision(page, self.timeouts.consent_event)
                    .await?
            }
            CmpStrategy::NativeApiCheck { procedure } => {
                self.tcf
                    .read_consent_vector(page, procedure, self.timeouts.consent_event)
                    .await?
            }
        };
        let present = vector.grants(vendor_id);
        debug!(vendor_id, present, vendors = vector.len(), "Consent vector checked");
        Ok(present)
    }

    /// Find the control in the shadow-pierced DOM snapshot and click it
    /// directly. Re-snapshots until the control shows up or the click budget
    /// runs out.
    async fn pierce_and_click(
        &self,
        page: &dyn Page,
        attribute: &'static str,
        value: &'static str,
    ) -> Result<(), ConsentError> {
        let policy = PollPolicy::new(self.timeouts.consent_click, self.timeouts.poll_interval);
        let node = poll_until(policy, |_| async move {
            let nodes = page.flattened_dom().await?;
            Ok::<_, ConsentError>(
                nodes
                    .into_iter()
                    .find(|n| n.attribute(attribute) == Some(value))
                    .map(|n| n.node_id),
            )
        })
        .await?
        .ok_or_else(|| ConsentError::ElementNotFound {
            attribute: attribute.to_string(),
            value: value.to_string(),
        })?;

        page.invoke_node(node, "click").await?;
        info!(attribute, value, "Shadow-pierced consent button clicked");
        Ok(())
    }
}
