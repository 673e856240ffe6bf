//! In-process DevTools endpoint for driver tests.
//!
//! Listens on a random loopback port, records every command it receives and
//! answers through a per-test responder that returns the raw messages
//! (replies and events) to write back.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

pub struct MockDevTools {
    url: String,
    commands: Arc<Mutex<Vec<Value>>>,
}

impl MockDevTools {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let respond: Responder = Arc::new(respond);

        let log = Arc::clone(&commands);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                tokio::spawn(serve(ws, Arc::clone(&log), Arc::clone(&respond)));
            }
        });

        Self {
            url: format!("ws://{addr}/devtools/browser/mock"),
            commands,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Method names in the order they arrived.
    pub fn methods(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| c["method"].as_str().map(str::to_string))
            .collect()
    }

    /// Every received command with `method`.
    pub fn sent(&self, method: &str) -> Vec<Value> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c["method"] == method)
            .cloned()
            .collect()
    }

    /// Wait up to one second for `method` to show up.
    pub async fn expect(&self, method: &str) -> Value {
        for _ in 0..100 {
            if let Some(cmd) = self.sent(method).pop() {
                return cmd;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{method} was never sent; got {:?}", self.methods());
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    log: Arc<Mutex<Vec<Value>>>,
    respond: Responder,
) {
    let (mut tx, mut rx) = ws.split();
    while let Some(Ok(msg)) = rx.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(cmd) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        log.lock().unwrap().push(cmd.clone());
        for out in respond(&cmd) {
            if tx.send(Message::Text(out.to_string().into())).await.is_err() {
                return;
            }
        }
    }
}

pub fn method(cmd: &Value) -> &str {
    cmd["method"].as_str().unwrap_or_default()
}

pub fn reply(cmd: &Value, result: Value) -> Value {
    json!({ "id": cmd["id"], "result": result })
}

pub fn fail(cmd: &Value, message: &str) -> Value {
    json!({ "id": cmd["id"], "error": { "code": -32000, "message": message } })
}

pub fn event(session_id: &str, method: &str, params: Value) -> Value {
    json!({ "method": method, "params": params, "sessionId": session_id })
}

/// Answers for target setup and housekeeping; everything else gets `{}`.
pub fn browser_basics(cmd: &Value) -> Vec<Value> {
    let result = match method(cmd) {
        "Target.createBrowserContext" => json!({ "browserContextId": "CTX1" }),
        "Target.createTarget" => json!({ "targetId": "T1" }),
        "Target.attachToTarget" => json!({ "sessionId": "S1" }),
        "Target.closeTarget" => json!({ "success": true }),
        _ => json!({}),
    };
    vec![reply(cmd, result)]
}

/// `Runtime.evaluate` result wrapper for a by-value answer.
pub fn value(v: Value) -> Value {
    json!({ "result": { "type": "object", "value": v } })
}
