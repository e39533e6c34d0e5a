//! Transcript extraction from editor documents.
//!
//! The editor stores documents as a JSON node tree (`{type, text?, attrs?,
//! content?}`). The transcript handed to the context manager is the text that
//! follows the last context separator, with accepted AI exchanges rendered
//! inline as `[user]` / `[AI]` turns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const TEXT: &str = "text";
const PARAGRAPH: &str = "paragraph";
const AI_BLOCK: &str = "aiBlock";
const SEPARATOR: &str = "contextSeparator";

/// A node of an editor document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorNode {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub attrs: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<EditorNode>,
}

impl EditorNode {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    fn separator_count(&self) -> usize {
        usize::from(self.kind == SEPARATOR)
            + self.content.iter().map(Self::separator_count).sum::<usize>()
    }
}

/// Extract the conversation transcript from a parsed document.
///
/// Only content after the last separator (in document order) is included,
/// the whole document when there is none.
pub fn extract_transcript(doc: &EditorNode) -> String {
    let mut remaining = doc.separator_count();
    let mut out = String::new();
    collect(doc, &mut remaining, &mut out);
    out
}

/// Parse a JSON document and extract its transcript.
pub fn extract_transcript_from_json(json: &str) -> serde_json::Result<String> {
    let doc: EditorNode = serde_json::from_str(json)?;
    Ok(extract_transcript(&doc))
}

fn collect(node: &EditorNode, remaining: &mut usize, out: &mut String) {
    // Past the last separator: the whole subtree counts, once
    if *remaining == 0 {
        render(node, out);
        return;
    }
    if node.kind == SEPARATOR {
        *remaining -= 1;
        return;
    }
    for child in &node.content {
        collect(child, remaining, out);
    }
}

fn render(node: &EditorNode, out: &mut String) {
    match node.kind.as_str() {
        TEXT => out.push_str(node.text.as_deref().unwrap_or_default()),
        AI_BLOCK => {
            if matches!(node.attr("status"), Some("accepted" | "complete")) {
                let prompt = node.attr("prompt").unwrap_or_default();
                let response = node.attr("response").unwrap_or_default();
                out.push_str(&format!("\n[user]: {prompt}\n[AI]: {response}\n"));
            }
        }
        SEPARATOR => {}
        kind => {
            for child in &node.content {
                render(child, out);
            }
            if kind == PARAGRAPH {
                out.push_str("\n\n");
            }
        }
    }
}
