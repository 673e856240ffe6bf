//! Element scripts and DOM snapshot parsing
//!
//! Element checks run as page JavaScript inside the handle's scope, so the
//! same code works for the top document and for isolated frame worlds.

use serde_json::Value;
use vendorscope_core::{DomNode, FrameHandle, NodeId};

/// Result of one click attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Clicked,
    Missing,
    Hidden,
    Disabled,
    Obscured,
}

impl ClickOutcome {
    pub fn from_value(value: &Value) -> Self {
        match value.as_str() {
            Some("clicked") => Self::Clicked,
            Some("hidden") => Self::Hidden,
            Some("disabled") => Self::Disabled,
            Some("obscured") => Self::Obscured,
            _ => Self::Missing,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Clicked => "clicked",
            Self::Missing => "element is not attached to the document",
            Self::Hidden => "element has no visible box",
            Self::Disabled => "element is disabled",
            Self::Obscured => "another element would receive the click",
        }
    }
}

fn js_string(s: &str) -> String {
    // A JSON string literal is a valid JS string literal.
    Value::String(s.to_string()).to_string()
}

/// Evaluates to `true` once the first match has a rendered, visible box.
pub fn visibility_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el || !el.isConnected) return false;
  const style = window.getComputedStyle(el);
  if (style.visibility === 'hidden' || style.display === 'none') return false;
  const rect = el.getBoundingClientRect();
  return rect.width > 0 && rect.height > 0;
}})()"#,
        sel = js_string(selector)
    )
}

/// Scrolls the first match into view and clicks it if it would receive the
/// pointer event. Evaluates to a [`ClickOutcome`] tag.
pub fn click_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el || !el.isConnected) return 'missing';
  if (el.disabled) return 'disabled';
  el.scrollIntoView({{ block: 'center', inline: 'center' }});
  const style = window.getComputedStyle(el);
  const rect = el.getBoundingClientRect();
  if (style.visibility === 'hidden' || style.display === 'none' || rect.width === 0 || rect.height === 0) return 'hidden';
  const hit = document.elementFromPoint(rect.left + rect.width / 2, rect.top + rect.height / 2);
  if (hit && hit !== el && !el.contains(hit)) return 'obscured';
  el.click();
  return 'clicked';
}})()"#,
        sel = js_string(selector)
    )
}

/// `Runtime.callFunctionOn` body that calls `method` with `this` bound to the node.
pub fn invoke_declaration(method: &str) -> String {
    format!("function() {{ this[{}](); }}", js_string(method))
}

/// Parse `DOM.getFlattenedDocument` into element nodes keyed by backend id.
///
/// Non-element nodes (text, comments, documents) are skipped.
pub fn parse_flattened_nodes(result: &Value) -> Vec<DomNode> {
    const ELEMENT_NODE: i64 = 1;

    let Some(nodes) = result.get("nodes").and_then(Value::as_array) else {
        return Vec::new();
    };

    nodes
        .iter()
        .filter(|n| n.get("nodeType").and_then(Value::as_i64) == Some(ELEMENT_NODE))
        .filter_map(|n| {
            let node_id = n.get("backendNodeId").and_then(Value::as_i64)?;
            let attributes = n
                .get("attributes")
                .and_then(Value::as_array)
                .map(|flat| {
                    flat.chunks_exact(2)
                        .filter_map(|pair| {
                            Some((pair[0].as_str()?.to_string(), pair[1].as_str()?.to_string()))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(DomNode {
                node_id: NodeId(node_id),
                node_name: n
                    .get("nodeName")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_ascii_lowercase(),
                attributes,
            })
        })
        .collect()
}

/// Parse `Page.getFrameTree` depth-first, main frame first.
pub fn parse_frame_tree(result: &Value) -> Vec<FrameHandle> {
    let mut frames = Vec::new();
    if let Some(tree) = result.get("frameTree") {
        collect_frames(tree, &mut frames);
    }
    frames
}

fn collect_frames(tree: &Value, out: &mut Vec<FrameHandle>) {
    if let Some(frame) = tree.get("frame") {
        let text = |key: &str| frame.get(key).and_then(Value::as_str).map(str::to_string);
        if let Some(id) = text("id") {
            out.push(FrameHandle {
                id,
                name: text("name").filter(|n| !n.is_empty()),
                url: text("url").unwrap_or_default(),
                parent_id: text("parentId"),
            });
        }
    }
    if let Some(children) = tree.get("childFrames").and_then(Value::as_array) {
        for child in children {
            collect_frames(child, out);
        }
    }
}

/// Pull the message out of a `Runtime.*` result that threw.
pub fn exception_message(result: &Value) -> Option<String> {
    let details = result.get("exceptionDetails")?;
    Some(
        details
            .get("exception")
            .and_then(|e| e.get("description"))
            .and_then(Value::as_str)
            .or_else(|| details.get("text").and_then(Value::as_str))
            .unwrap_or("unknown exception")
            .to_string(),
    )
}

/// The by-value payload of a `Runtime.*` result.
pub fn result_value(result: &Value) -> Value {
    result
        .get("result")
        .and_then(|r| r.get("value"))
        .cloned()
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selector_is_quoted_as_js_literal() {
        let script = visibility_script(r#"button[data-x="a'b"]"#);
        assert!(script.contains(r#"document.querySelector("button[data-x=\"a'b\"]")"#));
    }

    #[test]
    fn click_outcome_tags() {
        assert_eq!(ClickOutcome::from_value(&json!("clicked")), ClickOutcome::Clicked);
        assert_eq!(ClickOutcome::from_value(&json!("obscured")), ClickOutcome::Obscured);
        assert_eq!(ClickOutcome::from_value(&Value::Null), ClickOutcome::Missing);
    }

    #[test]
    fn invoke_declaration_quotes_method() {
        assert_eq!(invoke_declaration("click"), r#"function() { this["click"](); }"#);
    }

    #[test]
    fn flattened_nodes_keep_elements_with_attributes() {
        let result = json!({
            "nodes": [
                {"nodeId": 1, "backendNodeId": 10, "nodeType": 9, "nodeName": "#document"},
                {"nodeId": 2, "backendNodeId": 11, "nodeType": 1, "nodeName": "BUTTON",
                 "attributes": ["data-testid", "uc-accept-all-button", "class", "btn"]},
                {"nodeId": 3, "backendNodeId": 12, "nodeType": 3, "nodeName": "#text"}
            ]
        });
        let nodes = parse_flattened_nodes(&result);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_id, NodeId(11));
        assert_eq!(nodes[0].node_name, "button");
        assert_eq!(nodes[0].attribute("data-testid"), Some("uc-accept-all-button"));
        assert_eq!(nodes[0].attribute("class"), Some("btn"));
    }

    #[test]
    fn frame_tree_is_flattened_main_first() {
        let result = json!({
            "frameTree": {
                "frame": {"id": "MAIN", "url": "https://example.com/", "name": ""},
                "childFrames": [
                    {"frame": {"id": "CMP", "parentId": "MAIN", "url": "https://cmp.example/msg",
                               "name": "sp_message_iframe_1"}}
                ]
            }
        });
        let frames = parse_frame_tree(&result);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].id, "MAIN");
        assert_eq!(frames[0].name, None);
        assert_eq!(frames[1].parent_id.as_deref(), Some("MAIN"));
        assert_eq!(frames[1].name.as_deref(), Some("sp_message_iframe_1"));
    }

    #[test]
    fn exception_prefers_description() {
        let thrown = json!({
            "result": {"type": "object"},
            "exceptionDetails": {"text": "Uncaught", "exception": {"description": "TypeError: x"}}
        });
        assert_eq!(exception_message(&thrown).as_deref(), Some("TypeError: x"));
        assert_eq!(exception_message(&json!({"result": {"value": 1}})), None);
        assert_eq!(result_value(&json!({"result": {"value": 1}})), json!(1));
    }
}
