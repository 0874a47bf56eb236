//! Inline XML-style tag syntax.
//!
//! Structurally foreign node kinds are encoded as `<tag>{json}</tag>` spans.
//! The JSON payload carries the variant's fields plus an optional reserved
//! `state` object (durable id and ownership attribution) so internal
//! round-trips are lossless.

use crate::node::NodeState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub fn open(name: &str) -> String {
    format!("<{name}>")
}

pub fn close(name: &str) -> String {
    format!("</{name}>")
}

/// Tag payload envelope: variant fields flattened, reserved state beside them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Enveloped<T> {
    #[serde(flatten)]
    pub body: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<NodeState>,
}

pub fn encode_payload<T: Serialize>(body: &T, state: &NodeState) -> String {
    let envelope = Enveloped {
        body,
        state: if state.is_vacant() {
            None
        } else {
            Some(state.clone())
        },
    };
    serde_json::to_string(&envelope).expect("tag payload serializes to JSON")
}

pub fn decode_payload<T: DeserializeOwned>(json: &str) -> Result<(T, NodeState), serde_json::Error> {
    let envelope: Enveloped<T> = serde_json::from_str(json)?;
    Ok((envelope.body, envelope.state.unwrap_or_default()))
}

/// State-only payload for structural tags (`m-table`, `m-tr`, `m-td`).
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateOnly {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<NodeState>,
}

pub fn encode_state(state: &NodeState) -> String {
    if state.is_vacant() {
        return String::new();
    }
    serde_json::to_string(&StateOnly {
        state: Some(state.clone()),
    })
    .expect("node state serializes to JSON")
}

/// Parses an optional state-only payload; malformed JSON is a non-match.
pub fn decode_state(json: Option<&str>) -> Option<NodeState> {
    match json {
        None => Some(NodeState::default()),
        Some(json) if json.trim().is_empty() => Some(NodeState::default()),
        Some(json) => match serde_json::from_str::<StateOnly>(json) {
            Ok(payload) => Some(payload.state.unwrap_or_default()),
            Err(err) => {
                tracing::warn!(%err, "malformed structural tag payload");
                None
            }
        },
    }
}

/// Splits a leading JSON object off `input`, respecting strings and escapes.
pub fn take_json_object(input: &str) -> Option<(&str, &str)> {
    let bytes = input.as_bytes();
    if bytes.first() != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (index, &byte) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&input[..=index], &input[index + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// One multiline tag block: opening line (with optional payload), body lines,
/// closing line.
#[derive(Debug, Clone, PartialEq)]
pub struct TagBlock<'a> {
    pub payload: Option<&'a str>,
    pub body: Vec<&'a str>,
    pub consumed: usize,
}

/// Matches a multiline tag block starting at `lines[at]`. The opening tag
/// must begin its line; the closing tag must be a line of its own. Nested
/// same-name blocks are skipped over. Unclosed blocks are a non-match.
pub fn parse_tag_block<'a>(lines: &[&'a str], at: usize, name: &str) -> Option<TagBlock<'a>> {
    let open_tag = open(name);
    let close_tag = close(name);
    let first = lines.get(at)?.trim();
    let rest = first.strip_prefix(open_tag.as_str())?;
    let payload = if rest.is_empty() { None } else { Some(rest) };

    let mut depth = 1usize;
    let mut index = at + 1;
    while index < lines.len() {
        let trimmed = lines[index].trim();
        if trimmed.starts_with(open_tag.as_str()) {
            depth += 1;
        } else if trimmed == close_tag {
            depth -= 1;
            if depth == 0 {
                return Some(TagBlock {
                    payload,
                    body: lines[at + 1..index].to_vec(),
                    consumed: index - at + 1,
                });
            }
        }
        index += 1;
    }
    None
}
