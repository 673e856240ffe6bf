//! Site Validation Orchestrator
//!
//! Visits sites one after another in a shared browsing context and turns each
//! visit into exactly one [`SiteValidationResult`]. Nothing that goes wrong on
//! a single site stops the run.

use tracing::{info, warn};
use vendorscope_core::{
    BrowsingContext, ConsentError, DriverError, Page, SiteValidationResult, SiteVisit,
    ValidationRun, VendorId, VisitStage,
};
use vendorscope_logging::{sanitize_error, EventLogger, SiteEvent};

use crate::registry::{lookup, StrategyRunner};
use crate::tcf::TcfClient;
use crate::timeouts::Timeouts;

pub struct SiteValidator {
    tcf: TcfClient,
    strategies: StrategyRunner,
    timeouts: Timeouts,
}

impl SiteValidator {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            tcf: TcfClient::new(timeouts.poll_interval),
            strategies: StrategyRunner::new(timeouts),
            timeouts,
        }
    }

    /// Validate every site in order. Always yields one result per site.
    pub async fn run(
        &self,
        context: &dyn BrowsingContext,
        sites: &[String],
        vendor_id: VendorId,
    ) -> ValidationRun {
        let mut run = ValidationRun::new(vendor_id);
        let run_id = run.run_id.to_string();
        info!(run_id = %run_id, vendor_id, sites = sites.len(), "Validation run started");

        for (i, site) in sites.iter().enumerate() {
            info!(site = %site, progress = %format!("{}/{}", i + 1, sites.len()), "Validating site");
            let result = self.validate_site(context, site, vendor_id, &run_id).await;
            run.push(result);
        }

        run.finish();
        let summary = run.summary();
        info!(
            run_id = %run_id,
            present = summary.vendor_present,
            absent = summary.vendor_absent,
            no_tcf = summary.no_tcf,
            failed = summary.failed,
            "Validation run finished"
        );
        run
    }

    /// One isolated visit: reset the context, open a page, run the checks,
    /// close the page.
    pub async fn validate_site(
        &self,
        context: &dyn BrowsingContext,
        site: &str,
        vendor_id: VendorId,
        run_id: &str,
    ) -> SiteValidationResult {
        EventLogger::log_event(
            run_id,
            SiteEvent::Visiting {
                site: site.to_string(),
                vendor_id,
            },
        );
        let mut visit = SiteVisit::new(site, vendor_id);

        let outcome = match open_page(context).await {
            Ok(page) => {
                let outcome = self.visit(page.as_ref(), &mut visit, run_id).await;
                if let Err(e) = page.close().await {
                    warn!(site = %site, error = %e, "Failed to close page");
                }
                outcome
            }
            Err(e) => Err(e.into()),
        };

        finish(visit, outcome, run_id)
    }

    async fn visit(
        &self,
        page: &dyn Page,
        visit: &mut SiteVisit,
        run_id: &str,
    ) -> Result<(), ConsentError> {
        let t = &self.timeouts;
        let site = visit.site().to_string();

        visit.advance(VisitStage::Navigating);
        page.navigate(&site, t.navigation)
            .await
            .map_err(|e| navigation_failure(&site, e))?;

        visit.advance(VisitStage::DetectingApi);
        if !self.tcf.detect_api(page, t.api_detect).await? {
            info!(site = %site, "No TCF API found");
            visit.record_tcf(false);
            visit.record_vendor(false);
            visit.advance(VisitStage::NoTcf);
            return Ok(());
        }
        visit.record_tcf(true);

        visit.advance(VisitStage::IdentifyingCmp);
        let cmp_id = self.tcf.identify_cmp(page, t.ping).await?;
        visit.record_cmp(cmp_id);
        EventLogger::log_event(
            run_id,
            SiteEvent::CmpIdentified {
                site: site.clone(),
                cmp_id,
            },
        );

        visit.advance(VisitStage::DispatchingStrategy);
        let strategy = lookup(cmp_id)?;
        self.strategies.accept(strategy, page).await?;

        visit.advance(VisitStage::Verifying);
        let present = self
            .strategies
            .verify(strategy, page, visit.vendor_id())
            .await?;
        visit.record_vendor(present);
        Ok(())
    }
}

async fn open_page(context: &dyn BrowsingContext) -> Result<Box<dyn Page>, DriverError> {
    context.reset().await?;
    context.new_page().await
}

fn navigation_failure(site: &str, error: DriverError) -> ConsentError {
    match error {
        DriverError::NavigationFailed { url, reason } => ConsentError::NavigationFailure { url, reason },
        DriverError::Closed => ConsentError::Driver(DriverError::Closed),
        other => ConsentError::NavigationFailure {
            url: site.to_string(),
            reason: other.to_string(),
        },
    }
}

fn finish(
    visit: SiteVisit,
    outcome: Result<(), ConsentError>,
    run_id: &str,
) -> SiteValidationResult {
    let result = match outcome {
        Ok(()) => visit.complete(),
        Err(e) => {
            let message = sanitize_error(&e.to_string());
            warn!(site = %visit.site(), stage = %visit.stage(), error = %message, "Site validation failed");
            EventLogger::log_event(
                run_id,
                SiteEvent::Failure {
                    site: visit.site().to_string(),
                    stage: visit.stage().to_string(),
                    error_msg: message.clone(),
                },
            );
            visit.fail(message)
        }
    };

    EventLogger::log_event(
        run_id,
        SiteEvent::Outcome {
            site: result.site.clone(),
            has_tcf: result.has_tcf,
            cmp_id: result.cmp_id,
            vendor_is_present: result.vendor_is_present,
        },
    );
    result
}
