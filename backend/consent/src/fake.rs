//! Scripted in-memory browser for engine tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use vendorscope_core::{
    BrowsingContext, DomNode, DriverError, ElementHandle, FrameHandle, NodeId, Page, Scope,
};

use crate::tcf::{
    CONSENT_EVENT_SCRIPT, DETECT_SCRIPT, DIDOMI_READY_SCRIPT, DIDOMI_VENDORS_SCRIPT,
    GET_TC_DATA_SCRIPT, PING_SCRIPT, STORED_CONSENT_EVENT_SCRIPT,
};

/// How one site behaves. `None` answers hang until the caller's budget ends.
#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pub navigation_error: Option<String>,
    pub has_tcf: bool,
    pub ping: Option<Value>,
    pub consent_event: Option<Value>,
    /// Consent listeners torn down by a reload before one gets an answer.
    pub consent_reloads: usize,
    pub tc_data: Option<Value>,
    pub didomi_vendors: Option<Value>,
    /// Elements that become visible, by scope.
    pub visible: Vec<(Scope, String)>,
    /// Visible elements whose click never lands.
    pub unclickable: Vec<String>,
    /// Elements whose document is replaced while waiting for them.
    pub lost_context: Vec<String>,
    pub dom: Vec<DomNode>,
}

impl FakeSite {
    /// A TCF site whose CMP answers ping with `cmp_id`.
    pub fn tcf(cmp_id: u32) -> Self {
        Self {
            has_tcf: true,
            ping: Some(json!({"cmpId": cmp_id, "cmpLoaded": true, "apiVersion": "2.2"})),
            ..Default::default()
        }
    }

    /// Consent event payload granting exactly `consents`.
    pub fn with_consents(mut self, consents: &[(u32, bool)]) -> Self {
        let map: serde_json::Map<String, Value> = consents
            .iter()
            .map(|(id, granted)| (id.to_string(), Value::Bool(*granted)))
            .collect();
        self.consent_event = Some(json!({
            "eventStatus": "useractioncomplete",
            "vendor": {"consents": map}
        }));
        self
    }

    pub fn with_lost_context(mut self, selector: &str) -> Self {
        self.lost_context.push(selector.to_string());
        self
    }

    pub fn with_visible(mut self, scope: Scope, selector: &str) -> Self {
        self.visible.push((scope, selector.to_string()));
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeLog {
    pub resets: usize,
    pub pages_opened: usize,
    pub closes: usize,
    pub navigations: Vec<String>,
    pub evaluations: usize,
    pub consent_listens: Vec<&'static str>,
    pub waits: Vec<String>,
    pub clicks: Vec<String>,
    pub invoked: Vec<(NodeId, String)>,
}

type SharedLog = Arc<Mutex<FakeLog>>;

fn lock(log: &SharedLog) -> MutexGuard<'_, FakeLog> {
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct FakePage {
    sites: Arc<HashMap<String, FakeSite>>,
    current: Mutex<Option<FakeSite>>,
    log: SharedLog,
}

impl FakePage {
    /// A page already sitting on `site`.
    pub fn with_site(site: FakeSite) -> Self {
        Self {
            sites: Arc::default(),
            current: Mutex::new(Some(site)),
            log: SharedLog::default(),
        }
    }

    pub fn log(&self) -> MutexGuard<'_, FakeLog> {
        lock(&self.log)
    }

    fn site(&self) -> FakeSite {
        self.current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .unwrap_or_default()
    }
}

async fn hang(operation: &str, timeout: Duration) -> DriverError {
    tokio::time::sleep(timeout).await;
    DriverError::Timeout {
        operation: operation.to_string(),
        duration: timeout,
    }
}

fn context_destroyed() -> DriverError {
    DriverError::ContextLost {
        detail: "Runtime.evaluate failed (-32000): Execution context was destroyed.".into(),
    }
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        lock(&self.log).navigations.push(url.to_string());
        let Some(site) = self.sites.get(url).cloned() else {
            return Err(DriverError::NavigationFailed {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".into(),
            });
        };
        if let Some(reason) = &site.navigation_error {
            return Err(DriverError::NavigationFailed {
                url: url.to_string(),
                reason: reason.clone(),
            });
        }
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(site);
        Ok(())
    }

    async fn evaluate(
        &self,
        _scope: &Scope,
        script: &str,
        timeout: Duration,
    ) -> Result<Value, DriverError> {
        lock(&self.log).evaluations += 1;
        let site = self.site();

        if let Some(listener) = [CONSENT_EVENT_SCRIPT, STORED_CONSENT_EVENT_SCRIPT]
            .into_iter()
            .find(|s| *s == script)
        {
            let listens = {
                let mut log = lock(&self.log);
                log.consent_listens.push(listener);
                log.consent_listens.len()
            };
            if listens <= site.consent_reloads {
                return Err(context_destroyed());
            }
        }

        let answer = match script {
            DETECT_SCRIPT => return Ok(Value::Bool(site.has_tcf)),
            DIDOMI_READY_SCRIPT => return Ok(Value::Bool(site.didomi_vendors.is_some())),
            PING_SCRIPT => site.ping,
            CONSENT_EVENT_SCRIPT | STORED_CONSENT_EVENT_SCRIPT => site.consent_event,
            GET_TC_DATA_SCRIPT => Some(site.tc_data.unwrap_or(Value::Null)),
            DIDOMI_VENDORS_SCRIPT => site.didomi_vendors,
            _ => {
                return Err(DriverError::Script {
                    message: "ReferenceError: unexpected script".into(),
                })
            }
        };

        match answer {
            Some(value) => Ok(value),
            None => Err(hang("Runtime.evaluate", timeout).await),
        }
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
        lock(&self.log).waits.push(element.selector.clone());
        let site = self.site();
        if site.lost_context.contains(&element.selector) {
            return Err(context_destroyed());
        }
        let visible = site
            .visible
            .iter()
            .any(|(scope, sel)| *scope == element.scope && *sel == element.selector);
        if visible {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(DriverError::NotVisible {
            selector: element.selector.clone(),
        })
    }

    async fn click(&self, element: &ElementHandle, timeout: Duration) -> Result<(), DriverError> {
        if self.site().unclickable.contains(&element.selector) {
            tokio::time::sleep(timeout).await;
            return Err(DriverError::NotClickable {
                selector: element.selector.clone(),
                reason: "another element would receive the click".into(),
            });
        }
        lock(&self.log).clicks.push(element.selector.clone());
        Ok(())
    }

    async fn list_frames(&self) -> Result<Vec<FrameHandle>, DriverError> {
        Ok(vec![FrameHandle {
            id: "MAIN".into(),
            name: None,
            url: String::new(),
            parent_id: None,
        }])
    }

    async fn flattened_dom(&self) -> Result<Vec<DomNode>, DriverError> {
        Ok(self.site().dom)
    }

    async fn invoke_node(&self, node: NodeId, method: &str) -> Result<(), DriverError> {
        lock(&self.log).invoked.push((node, method.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        lock(&self.log).closes += 1;
        Ok(())
    }
}

/// Context serving pages over a fixed site table.
#[derive(Default)]
pub struct FakeContext {
    sites: Arc<HashMap<String, FakeSite>>,
    log: SharedLog,
    pub fail_new_page: bool,
}

impl FakeContext {
    pub fn new(sites: impl IntoIterator<Item = (&'static str, FakeSite)>) -> Self {
        Self {
            sites: Arc::new(sites.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
            ..Default::default()
        }
    }

    pub fn log(&self) -> MutexGuard<'_, FakeLog> {
        lock(&self.log)
    }
}

#[async_trait]
impl BrowsingContext for FakeContext {
    async fn reset(&self) -> Result<(), DriverError> {
        lock(&self.log).resets += 1;
        Ok(())
    }

    async fn new_page(&self) -> Result<Box<dyn Page>, DriverError> {
        if self.fail_new_page {
            return Err(DriverError::Closed);
        }
        lock(&self.log).pages_opened += 1;
        Ok(Box::new(FakePage {
            sites: Arc::clone(&self.sites),
            current: Mutex::new(None),
            log: Arc::clone(&self.log),
        }))
    }
}
