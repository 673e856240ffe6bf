//! Browser and browsing context
//!
//! A [`CdpBrowser`] owns the DevTools connection (and the process, when it
//! launched one). A [`CdpContext`] hands out pages from one incognito-style
//! browser context; `reset` swaps that context for a brand-new one, so
//! nothing a site stored survives into the next visit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vendorscope_core::{BrowsingContext, DriverError, Page};

use crate::cdp_client::CdpClient;
use crate::launcher::{ChromeProcess, LaunchError, LaunchOptions};
use crate::page_control::CdpPage;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum BrowserStartError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("failed to connect to browser: {0}")]
    Connect(#[from] DriverError),
}

pub struct CdpBrowser {
    client: Arc<CdpClient>,
    process: Option<ChromeProcess>,
    command_timeout: Duration,
}

impl CdpBrowser {
    /// Start a local browser and connect to it.
    pub async fn launch(options: &LaunchOptions) -> Result<Self, BrowserStartError> {
        let process = ChromeProcess::launch(options).await?;
        let client = CdpClient::connect(process.ws_url()).await?;
        Ok(Self {
            client,
            process: Some(process),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    /// Attach to a browser someone else started.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserStartError> {
        let client = CdpClient::connect(ws_url).await?;
        Ok(Self {
            client,
            process: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Product and protocol version, for the run log.
    pub async fn version(&self) -> Result<String, DriverError> {
        let v = self
            .client
            .call("Browser.getVersion", json!({}), self.command_timeout)
            .await?;
        Ok(v.get("product")
            .and_then(|p| p.as_str())
            .unwrap_or("unknown")
            .to_string())
    }

    /// Create a fresh browser context with its own cookie jar and storage.
    pub async fn new_context(&self) -> Result<CdpContext, DriverError> {
        let context_id = create_browser_context(&self.client, self.command_timeout).await?;
        Ok(CdpContext {
            client: Arc::clone(&self.client),
            context_id: Mutex::new(context_id),
            used: AtomicBool::new(false),
            command_timeout: self.command_timeout,
        })
    }

    /// Close the browser. A launched process is killed; an attached browser
    /// is only disconnected.
    pub async fn close(self) {
        match self.process {
            Some(process) => {
                if let Err(e) = self
                    .client
                    .call("Browser.close", json!({}), self.command_timeout)
                    .await
                {
                    debug!(error = %e, "Browser.close failed, killing process");
                }
                process.shutdown().await;
                info!("Browser stopped");
            }
            None => info!("Detached from browser"),
        }
    }
}

pub struct CdpContext {
    client: Arc<CdpClient>,
    /// Browser context pages are currently opened in.
    context_id: Mutex<String>,
    /// Set once a page was opened since the last reset.
    used: AtomicBool,
    command_timeout: Duration,
}

impl CdpContext {
    /// Dispose of the context on the browser side.
    pub async fn dispose(self) -> Result<(), DriverError> {
        let context_id = self.context_id.into_inner();
        dispose_browser_context(&self.client, &context_id, self.command_timeout).await
    }
}

#[async_trait]
impl BrowsingContext for CdpContext {
    /// Replace the browser context with a new one. Cookies, cache and every
    /// kind of origin storage go away with the old context.
    async fn reset(&self) -> Result<(), DriverError> {
        let mut current = self.context_id.lock().await;
        if !self.used.swap(false, Ordering::SeqCst) {
            debug!(context = %*current, "Browsing context unused, nothing to reset");
            return Ok(());
        }

        let fresh = match create_browser_context(&self.client, self.command_timeout).await {
            Ok(id) => id,
            Err(e) => {
                // Still dirty; the next reset has to try again.
                self.used.store(true, Ordering::SeqCst);
                return Err(e);
            }
        };
        let stale = std::mem::replace(&mut *current, fresh);

        // The new context is already isolated; a leftover one only leaks.
        if let Err(e) = dispose_browser_context(&self.client, &stale, self.command_timeout).await {
            warn!(context = %stale, error = %e, "Failed to dispose previous browser context");
        }
        debug!(previous = %stale, context = %*current, "Browsing context reset");
        Ok(())
    }

    async fn new_page(&self) -> Result<Box<dyn Page>, DriverError> {
        let context_id = self.context_id.lock().await.clone();
        self.used.store(true, Ordering::SeqCst);
        let page = CdpPage::open(Arc::clone(&self.client), &context_id, self.command_timeout).await?;
        Ok(Box::new(page))
    }
}

async fn create_browser_context(client: &CdpClient, timeout: Duration) -> Result<String, DriverError> {
    let created = client
        .call(
            "Target.createBrowserContext",
            json!({ "disposeOnDetach": true }),
            timeout,
        )
        .await?;
    let context_id = created
        .get("browserContextId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DriverError::Protocol {
            detail: "Target.createBrowserContext returned no browserContextId".into(),
        })?
        .to_string();
    debug!(context = %context_id, "Browser context created");
    Ok(context_id)
}

async fn dispose_browser_context(
    client: &CdpClient,
    context_id: &str,
    timeout: Duration,
) -> Result<(), DriverError> {
    client
        .call(
            "Target.disposeBrowserContext",
            json!({ "browserContextId": context_id }),
            timeout,
        )
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_devtools::{browser_basics, fail, method, reply, MockDevTools};
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;

    /// Numbered browser contexts; creation number `fail_on` is rejected.
    async fn browser(fail_on: Option<usize>) -> (MockDevTools, CdpBrowser) {
        let created = Arc::new(AtomicUsize::new(0));
        let mock = MockDevTools::start(move |cmd: &Value| match method(cmd) {
            "Target.createBrowserContext" => {
                let n = created.fetch_add(1, Ordering::SeqCst) + 1;
                if Some(n) == fail_on {
                    vec![fail(cmd, "Failed to create browser context")]
                } else {
                    vec![reply(cmd, json!({ "browserContextId": format!("CTX{n}") }))]
                }
            }
            _ => browser_basics(cmd),
        })
        .await;
        let browser = CdpBrowser::connect(mock.url())
            .await
            .unwrap()
            .with_command_timeout(Duration::from_secs(2));
        (mock, browser)
    }

    fn target_contexts(mock: &MockDevTools) -> Vec<String> {
        mock.sent("Target.createTarget")
            .iter()
            .map(|c| c["params"]["browserContextId"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn reset_swaps_in_a_fresh_context() {
        let (mock, browser) = browser(None).await;
        let context = browser.new_context().await.unwrap();

        let page = context.new_page().await.unwrap();
        page.close().await.unwrap();
        context.reset().await.unwrap();
        let page = context.new_page().await.unwrap();
        page.close().await.unwrap();

        assert_eq!(target_contexts(&mock), vec!["CTX1", "CTX2"]);
        let disposed = mock.sent("Target.disposeBrowserContext");
        assert_eq!(disposed.len(), 1);
        assert_eq!(disposed[0]["params"]["browserContextId"], "CTX1");
    }

    #[tokio::test]
    async fn reset_of_unused_context_is_free() {
        let (mock, browser) = browser(None).await;
        let context = browser.new_context().await.unwrap();

        context.reset().await.unwrap();
        context.reset().await.unwrap();

        assert_eq!(mock.sent("Target.createBrowserContext").len(), 1);
        assert!(mock.sent("Target.disposeBrowserContext").is_empty());
    }

    #[tokio::test]
    async fn failed_reset_is_reported_and_retried() {
        let (mock, browser) = browser(Some(2)).await;
        let context = browser.new_context().await.unwrap();
        let page = context.new_page().await.unwrap();
        page.close().await.unwrap();

        assert!(context.reset().await.is_err());
        context.reset().await.unwrap();
        let page = context.new_page().await.unwrap();
        page.close().await.unwrap();

        assert_eq!(target_contexts(&mock), vec!["CTX1", "CTX3"]);
    }

    #[tokio::test]
    async fn dispose_targets_the_current_context() {
        let (mock, browser) = browser(None).await;
        let context = browser.new_context().await.unwrap();
        context.new_page().await.unwrap().close().await.unwrap();
        context.reset().await.unwrap();

        context.dispose().await.unwrap();
        let disposed: Vec<_> = mock
            .sent("Target.disposeBrowserContext")
            .iter()
            .map(|c| c["params"]["browserContextId"].clone())
            .collect();
        assert_eq!(disposed, vec![json!("CTX1"), json!("CTX2")]);
        browser.close().await;
    }
}
