//! Chrome DevTools Protocol client
//!
//! One WebSocket connection to the browser endpoint. Page targets are
//! attached in flat mode, so commands for a page carry its `sessionId` on
//! the same socket and events come back tagged with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use vendorscope_core::DriverError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>;

const EVENT_BUFFER: usize = 512;

/// Error texts Chrome uses when a script's document went away mid-call.
const CONTEXT_LOST_MESSAGES: &[&str] = &[
    "Execution context was destroyed",
    "Cannot find context with specified id",
    "Cannot find default execution context",
    "Inspected target navigated or closed",
];

/// An event pushed by the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    /// Set for events raised by an attached page target.
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CdpCommand<'a> {
    id: u64,
    method: &'a str,
    params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

/// A reply correlated to a command id.
#[derive(Debug, Clone)]
pub struct CdpResponse {
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<CdpResponseError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponseError {
    pub code: i64,
    pub message: String,
    pub data: Option<String>,
}

impl CdpResponseError {
    fn into_driver_error(self, method: &str) -> DriverError {
        let mut detail = format!("{method} failed ({}): {}", self.code, self.message);
        if let Some(data) = self.data {
            detail.push_str(": ");
            detail.push_str(&data);
        }
        if CONTEXT_LOST_MESSAGES.iter().any(|m| self.message.contains(m)) {
            DriverError::ContextLost { detail }
        } else {
            DriverError::Protocol { detail }
        }
    }
}

/// Shared connection to a browser's DevTools endpoint.
pub struct CdpClient {
    next_id: AtomicU64,
    pending: PendingMap,
    writer: Mutex<WsSink>,
    events: broadcast::Sender<CdpEvent>,
    reader: JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a `ws://host:port/devtools/browser/<id>` endpoint.
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>, DriverError> {
        info!(url = ws_url, "Connecting to DevTools endpoint");

        let (stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| DriverError::Protocol {
                detail: format!("failed to connect to {ws_url}: {e}"),
            })?;
        let (writer, reader) = stream.split();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let reader = tokio::spawn(read_loop(reader, Arc::clone(&pending), events.clone()));

        Ok(Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending,
            writer: Mutex::new(writer),
            events,
            reader,
        }))
    }

    /// Subscribe to every event received after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Send a browser-level command.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, DriverError> {
        self.send(None, method, params, timeout).await
    }

    /// Send a command to an attached session (or the browser if `None`).
    pub async fn send(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, DriverError> {
        if self.reader.is_finished() {
            return Err(DriverError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let text = serde_json::to_string(&CdpCommand {
            id,
            method,
            params,
            session_id,
        })
        .map_err(|e| DriverError::Protocol {
            detail: format!("failed to serialize {method}: {e}"),
        })?;

        // Register before writing so a fast reply can't slip past us.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        debug!(id, method, session = session_id.unwrap_or("-"), "CDP command");
        let sent = self.writer.lock().await.send(Message::Text(text.into())).await;
        if let Err(e) = sent {
            self.pending.lock().await.remove(&id);
            return Err(DriverError::Protocol {
                detail: format!("failed to write {method}: {e}"),
            });
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(DriverError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(DriverError::Timeout {
                    operation: method.to_string(),
                    duration: timeout,
                });
            }
        };

        if let Some(err) = response.error {
            return Err(err.into_driver_error(method));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut reader: SplitStream<WsStream>,
    pending: PendingMap,
    events: broadcast::Sender<CdpEvent>,
) {
    while let Some(msg) = reader.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Binary(b)) => match String::from_utf8(b.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => {
                info!("DevTools connection closed by browser");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "DevTools read error, stopping reader");
                break;
            }
        };

        let json: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Unparseable DevTools message");
                continue;
            }
        };

        if let Some(response) = parse_cdp_response(&json) {
            match pending.lock().await.remove(&response.id) {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => debug!(id = response.id, "Reply for abandoned command"),
            }
        } else if let Some(event) = parse_cdp_event(&json) {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }

    // Dropping the senders wakes every waiter with `Closed`.
    pending.lock().await.clear();
}

/// Split a reply into its parts. `None` for anything without an `id`.
pub fn parse_cdp_response(json: &Value) -> Option<CdpResponse> {
    let id = json.get("id")?.as_u64()?;
    Some(CdpResponse {
        id,
        result: json.get("result").cloned(),
        error: json
            .get("error")
            .and_then(|e| serde_json::from_value(e.clone()).ok()),
    })
}

/// Split an event into its parts. `None` for replies.
pub fn parse_cdp_event(json: &Value) -> Option<CdpEvent> {
    if json.get("id").is_some() {
        return None;
    }
    Some(CdpEvent {
        method: json.get("method")?.as_str()?.to_string(),
        params: json.get("params").cloned().unwrap_or(Value::Null),
        session_id: json
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
