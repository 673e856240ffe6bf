use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DriverError;
use crate::types::{DomNode, ElementHandle, FrameHandle, NodeId, Scope};

/// A single browser page, exclusively owned by one site visit.
///
/// Every call that can suspend takes an explicit budget; implementations must
/// return `DriverError::Timeout` instead of waiting past it.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait until the DOM has been parsed.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Evaluate a script in the given scope, awaiting promises, returning the value.
    async fn evaluate(
        &self,
        scope: &Scope,
        script: &str,
        timeout: Duration,
    ) -> Result<Value, DriverError>;

    /// Build a handle for `selector` in `scope`. Does not wait for the element.
    async fn locate(&self, scope: &Scope, selector: &str) -> Result<ElementHandle, DriverError>;

    /// Wait until the element exists and is rendered visibly.
    async fn wait_visible(
        &self,
        element: &ElementHandle,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Activate the element.
    async fn click(&self, element: &ElementHandle, timeout: Duration) -> Result<(), DriverError>;

    /// All frames of the page, main frame first.
    async fn list_frames(&self) -> Result<Vec<FrameHandle>, DriverError>;

    /// Flattened DOM snapshot that includes closed shadow roots and frames.
    async fn flattened_dom(&self) -> Result<Vec<DomNode>, DriverError>;

    /// Resolve a node to a live object and call `method()` on it, bypassing
    /// visibility checks.
    async fn invoke_node(&self, node: NodeId, method: &str) -> Result<(), DriverError>;

    /// Release the page. Safe to call more than once.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Cookie jar and cache shared by consecutive site visits.
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    /// Drop cookies, cache and storage so the next visit starts clean.
    async fn reset(&self) -> Result<(), DriverError>;

    /// Open a fresh page in this context.
    async fn new_page(&self) -> Result<Box<dyn Page>, DriverError>;
}
