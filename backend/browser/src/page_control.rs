//! Page Control
//!
//! [`CdpPage`] drives one tab through its flat DevTools session: navigation,
//! script evaluation in the top document or an iframe, element waits and
//! clicks, and the shadow-piercing DOM snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use vendorscope_core::{DomNode, DriverError, ElementHandle, FrameHandle, NodeId, Page, Scope};

use crate::cdp_client::CdpClient;
use crate::element_query::{
    click_script, exception_message, invoke_declaration, parse_flattened_nodes, parse_frame_tree,
    result_value, visibility_script, ClickOutcome,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const WORLD_NAME: &str = "vendorscope";

pub struct CdpPage {
    client: Arc<CdpClient>,
    target_id: String,
    session_id: String,
    /// Frame selector -> isolated world execution context.
    frame_worlds: Mutex<HashMap<String, i64>>,
    closed: AtomicBool,
    command_timeout: Duration,
}

impl CdpPage {
    /// Create a blank tab in `browser_context_id` and attach to it.
    pub(crate) async fn open(
        client: Arc<CdpClient>,
        browser_context_id: &str,
        command_timeout: Duration,
    ) -> Result<Self, DriverError> {
        let created = client
            .call(
                "Target.createTarget",
                json!({ "url": "about:blank", "browserContextId": browser_context_id }),
                command_timeout,
            )
            .await?;
        let target_id = required_str(&created, "targetId", "Target.createTarget")?;

        // From here on the drop guard closes the tab if setup fails.
        let mut page = Self {
            client,
            target_id,
            session_id: String::new(),
            frame_worlds: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            command_timeout,
        };

        let attached = page
            .client
            .call(
                "Target.attachToTarget",
                json!({ "targetId": page.target_id, "flatten": true }),
                command_timeout,
            )
            .await?;
        page.session_id = required_str(&attached, "sessionId", "Target.attachToTarget")?;

        for domain in ["Page", "Runtime", "DOM"] {
            page.command(&format!("{domain}.enable"), json!({})).await?;
        }

        debug!(target = %page.target_id, session = %page.session_id, "Page opened");
        Ok(page)
    }

    async fn command(&self, method: &str, params: Value) -> Result<Value, DriverError> {
        self.command_within(method, params, self.command_timeout).await
    }

    async fn command_within(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        self.client
            .send(Some(&self.session_id), method, params, timeout)
            .await
    }

    async fn run_script(
        &self,
        context_id: Option<i64>,
        script: &str,
        timeout: Duration,
    ) -> Result<Value, DriverError> {
        let mut params = json!({
            "expression": script,
            "returnByValue": true,
            "awaitPromise": true,
            "userGesture": true,
        });
        if let Some(id) = context_id {
            params["contextId"] = json!(id);
        }

        let result = self.command_within("Runtime.evaluate", params, timeout).await?;
        if let Some(message) = exception_message(&result) {
            return Err(DriverError::Script { message });
        }
        Ok(result_value(&result))
    }

    async fn evaluate_in(
        &self,
        scope: &Scope,
        script: &str,
        timeout: Duration,
    ) -> Result<Value, DriverError> {
        let Scope::Frame(selector) = scope else {
            return self.run_script(None, script, timeout).await;
        };

        let context = self.frame_context(selector).await?;
        match self.run_script(Some(context), script, timeout).await {
            Err(e) if e.is_context_lost() => {
                // The frame navigated and took its world with it.
                debug!(frame = %selector, error = %e, "Recreating isolated world");
                self.frame_worlds.lock().await.remove(selector);
                let context = self.frame_context(selector).await?;
                self.run_script(Some(context), script, timeout).await
            }
            other => other,
        }
    }

    /// Execution context for the content document of the first iframe
    /// matching `selector`.
    async fn frame_context(&self, selector: &str) -> Result<i64, DriverError> {
        if let Some(id) = self.frame_worlds.lock().await.get(selector) {
            return Ok(*id);
        }
        let not_found = || DriverError::FrameNotFound {
            selector: selector.to_string(),
        };

        let doc = self.command("DOM.getDocument", json!({ "depth": 0 })).await?;
        let root = doc
            .pointer("/root/nodeId")
            .and_then(Value::as_i64)
            .ok_or_else(|| protocol("DOM.getDocument returned no root"))?;

        let found = self
            .command(
                "DOM.querySelector",
                json!({ "nodeId": root, "selector": selector }),
            )
            .await?;
        let node_id = found
            .get("nodeId")
            .and_then(Value::as_i64)
            .filter(|id| *id != 0)
            .ok_or_else(not_found)?;

        // Only frame owner elements carry a frameId.
        let described = self
            .command("DOM.describeNode", json!({ "nodeId": node_id }))
            .await?;
        let frame_id = described
            .pointer("/node/frameId")
            .and_then(Value::as_str)
            .ok_or_else(not_found)?;

        let world = self
            .command(
                "Page.createIsolatedWorld",
                json!({
                    "frameId": frame_id,
                    "worldName": WORLD_NAME,
                    "grantUniveralAccess": true,
                }),
            )
            .await?;
        let context = world
            .get("executionContextId")
            .and_then(Value::as_i64)
            .ok_or_else(|| protocol("Page.createIsolatedWorld returned no context"))?;

        self.frame_worlds
            .lock()
            .await
            .insert(selector.to_string(), context);
        Ok(context)
    }

    async fn wait_for_dom_content(
        &self,
        url: &str,
        events: &mut tokio::sync::broadcast::Receiver<crate::cdp_client::CdpEvent>,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, events.recv()).await {
                Ok(Ok(event)) => {
                    if event.method == "Page.domContentEventFired"
                        && event.session_id.as_deref() == Some(self.session_id.as_str())
                    {
                        return Ok(());
                    }
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    debug!(skipped, "Event receiver lagged during navigation");
                }
                Ok(Err(RecvError::Closed)) => return Err(DriverError::Closed),
                Err(_) => {
                    return Err(DriverError::Timeout {
                        operation: format!("navigation to {url}"),
                        duration: timeout,
                    })
                }
            }
        }
    }
}

#[async_trait]
impl Page for CdpPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        let mut events = self.client.subscribe();

        let result = self
            .command_within("Page.navigate", json!({ "url": url }), timeout)
            .await
            .map_err(|e| match e {
                DriverError::Timeout { .. } => DriverError::Timeout {
                    operation: format!("navigation to {url}"),
                    duration: timeout,
                },
                other => other,
            })?;

        if let Some(reason) = result.get("errorText").and_then(Value::as_str) {
            return Err(DriverError::NavigationFailed {
                url: url.to_string(),
                reason: reason.to_string(),
            });
        }

        self.frame_worlds.lock().await.clear();

        // No loader means a same-document navigation with no new DOM.
        if result.get("loaderId").is_some() {
            self.wait_for_dom_content(url, &mut events, deadline, timeout)
                .await?;
        }
        Ok(())
    }

    async fn evaluate(
        &self,
        scope: &Scope,
        script: &str,
        timeout: Duration,
    ) -> Result<Value, DriverError> {
        self.evaluate_in(scope, script, timeout).await
    }

    async fn locate(&self, scope: &Scope, selector: &str) -> Result<ElementHandle, DriverError> {
        Ok(ElementHandle {
            scope: scope.clone(),
            selector: selector.to_string(),
        })
    }

    async fn wait_visible(
        &self,
        element: &ElementHandle,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        let script = visibility_script(&element.selector);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DriverError::NotVisible {
                    selector: describe(element),
                });
            }
            match self.evaluate_in(&element.scope, &script, remaining).await {
                Ok(Value::Bool(true)) => return Ok(()),
                Ok(_) | Err(DriverError::FrameNotFound { .. }) => {}
                Err(e) if e.is_timeout() || e.is_context_lost() => {}
                Err(e) => return Err(e),
            }
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }

    async fn click(&self, element: &ElementHandle, timeout: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        let script = click_script(&element.selector);
        let mut last = ClickOutcome::Missing;
        let mut frame_missing = false;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                if frame_missing {
                    if let Scope::Frame(frame) = &element.scope {
                        return Err(DriverError::FrameNotFound {
                            selector: frame.clone(),
                        });
                    }
                }
                return Err(DriverError::NotClickable {
                    selector: describe(element),
                    reason: last.reason().to_string(),
                });
            }

            match self.evaluate_in(&element.scope, &script, remaining).await {
                Ok(value) => {
                    frame_missing = false;
                    last = ClickOutcome::from_value(&value);
                    if last == ClickOutcome::Clicked {
                        debug!(element = %describe(element), "Clicked");
                        return Ok(());
                    }
                }
                Err(DriverError::FrameNotFound { .. }) => frame_missing = true,
                Err(e) if e.is_timeout() || e.is_context_lost() => {
                    debug!(element = %describe(element), error = %e, "Click attempt interrupted");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }

    async fn list_frames(&self) -> Result<Vec<FrameHandle>, DriverError> {
        let tree = self.command("Page.getFrameTree", json!({})).await?;
        Ok(parse_frame_tree(&tree))
    }

    async fn flattened_dom(&self) -> Result<Vec<DomNode>, DriverError> {
        let doc = self
            .command(
                "DOM.getFlattenedDocument",
                json!({ "depth": -1, "pierce": true }),
            )
            .await?;
        Ok(parse_flattened_nodes(&doc))
    }

    async fn invoke_node(&self, node: NodeId, method: &str) -> Result<(), DriverError> {
        let gone = || DriverError::ElementNotFound {
            selector: format!("backend node {}", node.0),
        };

        let resolved = self
            .command("DOM.resolveNode", json!({ "backendNodeId": node.0 }))
            .await
            .map_err(|e| match e {
                DriverError::Protocol { .. } => gone(),
                other => other,
            })?;
        let object_id = resolved
            .pointer("/object/objectId")
            .and_then(Value::as_str)
            .ok_or_else(gone)?
            .to_string();

        let result = self
            .command(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": invoke_declaration(method),
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Err(e) = self
            .command("Runtime.releaseObject", json!({ "objectId": object_id }))
            .await
        {
            debug!(error = %e, "Failed to release remote object");
        }

        match exception_message(&result) {
            Some(message) => Err(DriverError::Script { message }),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.client
            .call(
                "Target.closeTarget",
                json!({ "targetId": self.target_id }),
                self.command_timeout,
            )
            .await
            .map(|_| ())
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = Arc::clone(&self.client);
        let target_id = self.target_id.clone();
        let timeout = self.command_timeout;
        runtime.spawn(async move {
            if let Err(e) = client
                .call("Target.closeTarget", json!({ "targetId": target_id }), timeout)
                .await
            {
                debug!(error = %e, target = %target_id, "Closing dropped page failed");
            }
        });
    }
}

fn describe(element: &ElementHandle) -> String {
    match &element.scope {
        Scope::Document => element.selector.clone(),
        Scope::Frame(frame) => format!("{} in frame {frame}", element.selector),
    }
}

fn protocol(detail: &str) -> DriverError {
    DriverError::Protocol {
        detail: detail.to_string(),
    }
}

fn required_str(value: &Value, key: &str, method: &str) -> Result<String, DriverError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| protocol(&format!("{method} returned no {key}")))
}
