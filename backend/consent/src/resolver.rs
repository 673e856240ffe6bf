//! Consent Button Resolver
//!
//! Tries candidate selectors strictly in order and clicks the first one that
//! becomes visible and accepts the click.

use std::time::Duration;

use tracing::debug;
use vendorscope_core::{ConsentError, Page, Scope};

/// Click the first usable candidate and return the selector that won.
///
/// Each candidate gets the full `timeout` for its visibility wait and again
/// for its click. A candidate that is unavailable (not visible, not
/// clickable, missing, timed out, its document replaced) hands over to the
/// next; any other driver failure ends the scan.
pub async fn resolve_and_click<'s, S: AsRef<str>>(
    page: &dyn Page,
    selectors: &'s [S],
    scope: &Scope,
    timeout: Duration,
) -> Result<&'s str, ConsentError> {
    for selector in selectors {
        let selector = selector.as_ref();
        let element = page.locate(scope, selector).await?;

        let attempt = match page.wait_visible(&element, timeout).await {
            Ok(()) => {
                debug!(selector, scope = %scope, "Consent button visible");
                page.click(&element, timeout).await
            }
            Err(e) => Err(e),
        };

        match attempt {
            Ok(()) => return Ok(selector),
            Err(e) if e.is_element_unavailable() => {
                debug!(selector, error = %e, "Consent button unusable, trying next");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ConsentError::NoConsentControlFound {
        selectors: selectors.iter().map(|s| s.as_ref().to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakePage, FakeSite};

    const BUDGET: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn skips_invisible_candidate() {
        let page = FakePage::with_site(FakeSite::default().with_visible(Scope::Document, ".b"));

        let clicked = resolve_and_click(&page, &["#a", ".b"], &Scope::Document, BUDGET)
            .await
            .unwrap();

        assert_eq!(clicked, ".b");
        let log = page.log();
        assert_eq!(log.clicks, vec![".b"]);
        assert_eq!(log.waits, vec!["#a", ".b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_visible_wins_and_later_ones_are_untouched() {
        let site = FakeSite::default()
            .with_visible(Scope::Document, "#a")
            .with_visible(Scope::Document, ".b");
        let page = FakePage::with_site(site);

        let clicked = resolve_and_click(&page, &["#a", ".b"], &Scope::Document, BUDGET)
            .await
            .unwrap();

        assert_eq!(clicked, "#a");
        assert_eq!(page.log().waits, vec!["#a"]);
        assert_eq!(page.log().clicks, vec!["#a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unclickable_candidate_falls_through() {
        let mut site = FakeSite::default()
            .with_visible(Scope::Document, "#a")
            .with_visible(Scope::Document, ".b");
        site.unclickable.push("#a".into());
        let page = FakePage::with_site(site);

        let clicked = resolve_and_click(&page, &["#a", ".b"], &Scope::Document, BUDGET)
            .await
            .unwrap();

        assert_eq!(clicked, ".b");
        assert_eq!(page.log().clicks, vec![".b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_while_waiting_moves_to_next_candidate() {
        let site = FakeSite::default()
            .with_lost_context("#a")
            .with_visible(Scope::Document, ".b");
        let page = FakePage::with_site(site);

        let clicked = resolve_and_click(&page, &["#a", ".b"], &Scope::Document, BUDGET)
            .await
            .unwrap();

        assert_eq!(clicked, ".b");
        assert_eq!(page.log().waits, vec!["#a", ".b"]);
        assert_eq!(page.log().clicks, vec![".b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_match_lists_all_candidates_in_order() {
        let page = FakePage::with_site(FakeSite::default());

        let err = resolve_and_click(&page, &["#btn1", "#btn2", ".x"], &Scope::Document, BUDGET)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "no consent button found with selectors: #btn1 | #btn2 | .x"
        );
        assert!(page.log().clicks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn each_candidate_gets_its_own_budget() {
        let page = FakePage::with_site(FakeSite::default());
        let start = tokio::time::Instant::now();

        let _ = resolve_and_click(&page, &["#a", "#b"], &Scope::Document, BUDGET).await;

        assert_eq!(start.elapsed(), BUDGET * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn frame_scope_only_sees_frame_elements() {
        let frame = Scope::Frame("#cmp-frame".into());
        let site = FakeSite::default()
            .with_visible(Scope::Document, "#a")
            .with_visible(frame.clone(), "#b");
        let page = FakePage::with_site(site);

        let clicked = resolve_and_click(&page, &["#a", "#b"], &frame, BUDGET)
            .await
            .unwrap();

        assert_eq!(clicked, "#b");
    }
}
