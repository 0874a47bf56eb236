//! Versioned JSON serialization schema for node subtrees.
//!
//! Each node's exported form carries `type`, a `version` integer, the
//! variant's own fields flattened into the envelope, a reserved `state`
//! container (`id`, `peerId`, `sharedPeerIds`) and `children`. Older
//! encodings are detected by `version` and migrated on import; the legacy
//! single-field code representation is rewritten into the current
//! multi-field form.

use super::kind::{
    ClassedBlock, CodeBlock, CommentMark, Completion, ContactMention, DateMention, Diff,
    DiffInsert, DocumentMention, Equation, Media, NodeKind, NodeKindTag, SearchMatch, TextRun,
    UserMention,
};
use super::{NodeSpec, NodeState};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

/// Current encoding version.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("node envelope is not an object")]
    NotAnObject,
    #[error("unknown node type: {0}")]
    UnknownType(String),
    #[error("unsupported version {version} for node type {kind}")]
    UnsupportedVersion { kind: String, version: u32 },
    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Tree(#[from] crate::tree::TreeError),
}

/// Encodes a spec subtree. Transient kinds are editor state, not content:
/// completions are dropped, search-match wrappers flatten to the text they
/// wrap.
pub fn encode_spec(spec: &NodeSpec) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), json!(spec.kind.tag().name()));
    map.insert("version".into(), json!(SCHEMA_VERSION));
    if let Value::Object(fields) = payload_value(&spec.kind) {
        for (key, value) in fields {
            map.insert(key, value);
        }
    }
    if !spec.state.is_vacant() {
        map.insert(
            "state".into(),
            serde_json::to_value(&spec.state).expect("node state serializes to JSON"),
        );
    }
    let mut children = Vec::new();
    encode_children(&spec.children, &mut children);
    if !children.is_empty() {
        map.insert("children".into(), Value::Array(children));
    }
    Value::Object(map)
}

fn encode_children(specs: &[NodeSpec], out: &mut Vec<Value>) {
    for child in specs {
        match child.kind.tag() {
            NodeKindTag::Completion => {}
            NodeKindTag::SearchMatch => encode_children(&child.children, out),
            _ => out.push(encode_spec(child)),
        }
    }
}

pub fn decode_spec(value: &Value) -> Result<NodeSpec, SchemaError> {
    let Value::Object(map) = value else {
        return Err(SchemaError::NotAnObject);
    };
    let kind_name = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SchemaError::NotAnObject)?
        .to_string();
    let version = map
        .get("version")
        .and_then(Value::as_u64)
        .unwrap_or(u64::from(SCHEMA_VERSION)) as u32;
    if version > SCHEMA_VERSION {
        return Err(SchemaError::UnsupportedVersion {
            kind: kind_name,
            version,
        });
    }

    let mut fields = Map::new();
    for (key, field) in map {
        if !matches!(key.as_str(), "type" | "version" | "state" | "children") {
            fields.insert(key.clone(), field.clone());
        }
    }

    let kind = decode_kind(&kind_name, version, fields)?;
    let state = match map.get("state") {
        Some(state) => {
            serde_json::from_value(state.clone()).map_err(|source| SchemaError::Malformed {
                kind: kind_name.clone(),
                source,
            })?
        }
        None => NodeState::default(),
    };
    let children = match map.get("children").and_then(Value::as_array) {
        Some(children) => children
            .iter()
            .map(decode_spec)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(NodeSpec {
        kind,
        state,
        children,
    })
}

fn payload_value(kind: &NodeKind) -> Value {
    match kind {
        NodeKind::Root
        | NodeKind::Paragraph
        | NodeKind::Table
        | NodeKind::TableRow
        | NodeKind::TableCell
        | NodeKind::DiffDelete
        | NodeKind::HorizontalRule => json!({}),
        NodeKind::Text(payload) => to_object(payload),
        NodeKind::UserMention(payload) => to_object(payload),
        NodeKind::ContactMention(payload) => to_object(payload),
        NodeKind::DocumentMention(payload) => to_object(payload),
        NodeKind::DateMention(payload) => to_object(payload),
        NodeKind::Equation(payload) => to_object(payload),
        NodeKind::Diff(payload) => to_object(payload),
        NodeKind::DiffInsert(payload) => to_object(payload),
        NodeKind::Media(payload) => to_object(payload),
        NodeKind::ClassedBlock(payload) => to_object(payload),
        NodeKind::CommentMark(payload) => to_object(payload),
        NodeKind::SearchMatch(payload) => to_object(payload),
        NodeKind::Completion(payload) => to_object(payload),
        NodeKind::CodeBlock(payload) => to_object(payload),
    }
}

fn to_object<T: serde::Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).expect("node payload serializes to JSON")
}

fn decode_kind(name: &str, version: u32, fields: Map<String, Value>) -> Result<NodeKind, SchemaError> {
    // The legacy generic code encoding is rewritten into the rich multi-field
    // form; `codeFence` is the generic type name it was stored under.
    if (name == "code" && version < 2) || name == "codeFence" {
        return Ok(migrate_legacy_code(fields));
    }

    let kind = match name {
        "root" => NodeKind::Root,
        "paragraph" => NodeKind::Paragraph,
        "table" => NodeKind::Table,
        "tableRow" => NodeKind::TableRow,
        "tableCell" => NodeKind::TableCell,
        "diffDelete" => NodeKind::DiffDelete,
        "horizontalRule" => NodeKind::HorizontalRule,
        "text" => NodeKind::Text(from_fields::<TextRun>(name, fields)?),
        "userMention" => NodeKind::UserMention(from_fields::<UserMention>(name, fields)?),
        "contactMention" => NodeKind::ContactMention(from_fields::<ContactMention>(name, fields)?),
        "docMention" => NodeKind::DocumentMention(from_fields::<DocumentMention>(name, fields)?),
        "dateMention" => NodeKind::DateMention(from_fields::<DateMention>(name, fields)?),
        "equation" => NodeKind::Equation(from_fields::<Equation>(name, fields)?),
        "diff" => NodeKind::Diff(from_fields::<Diff>(name, fields)?),
        "diffInsert" => NodeKind::DiffInsert(from_fields::<DiffInsert>(name, fields)?),
        "media" => NodeKind::Media(from_fields::<Media>(name, fields)?),
        "classedBlock" => NodeKind::ClassedBlock(from_fields::<ClassedBlock>(name, fields)?),
        "commentMark" => NodeKind::CommentMark(from_fields::<CommentMark>(name, fields)?),
        "searchMatch" => NodeKind::SearchMatch(from_fields::<SearchMatch>(name, fields)?),
        "completion" => NodeKind::Completion(from_fields::<Completion>(name, fields)?),
        "code" => NodeKind::CodeBlock(from_fields::<CodeBlock>(name, fields)?),
        other => return Err(SchemaError::UnknownType(other.to_string())),
    };
    Ok(kind)
}

fn from_fields<T: DeserializeOwned>(name: &str, fields: Map<String, Value>) -> Result<T, SchemaError> {
    serde_json::from_value(Value::Object(fields)).map_err(|source| SchemaError::Malformed {
        kind: name.to_string(),
        source,
    })
}

/// Version-1 code nodes stored a single `source` field whose first line was
/// the fence info string and the remainder the code body.
fn migrate_legacy_code(fields: Map<String, Value>) -> NodeKind {
    let source = fields
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let (language, code) = match source.split_once('\n') {
        Some((info, rest)) => {
            let info = info.trim();
            let language = if info.is_empty() {
                None
            } else {
                Some(info.to_string())
            };
            (language, rest.to_string())
        }
        None => (None, source.to_string()),
    };
    NodeKind::CodeBlock(CodeBlock { language, code })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn envelope_round_trip_preserves_state() {
        let id = Uuid::new_v4();
        let spec = NodeSpec::with_children(
            NodeKind::Paragraph,
            vec![NodeSpec::text("hello")],
        )
        .with_state(NodeState {
            id: Some(id),
            peer_id: Some(3),
            shared_peer_ids: vec![4, 5],
            local: Some(true),
        });

        let value = encode_spec(&spec);
        assert_eq!(value["type"], "paragraph");
        assert_eq!(value["version"], SCHEMA_VERSION);
        assert_eq!(value["state"]["peerId"], 3);

        let back = decode_spec(&value).unwrap();
        assert_eq!(back.state.id, Some(id));
        assert_eq!(back.state.shared_peer_ids, vec![4, 5]);
        // `local` is derived, never carried by the schema.
        assert_eq!(back.state.local, None);
        assert_eq!(back.children.len(), 1);
    }

    #[test]
    fn legacy_code_is_migrated_to_multi_field_form() {
        let value = json!({
            "type": "code",
            "version": 1,
            "source": "rust\nfn main() {}",
        });
        let spec = decode_spec(&value).unwrap();
        match spec.kind {
            NodeKind::CodeBlock(code) => {
                assert_eq!(code.language.as_deref(), Some("rust"));
                assert_eq!(code.code, "fn main() {}");
            }
            other => panic!("expected code block, got {other:?}"),
        }
    }

    #[test]
    fn generic_code_fence_name_is_migrated() {
        let value = json!({
            "type": "codeFence",
            "version": 1,
            "source": "\nplain body",
        });
        let spec = decode_spec(&value).unwrap();
        assert!(matches!(
            spec.kind,
            NodeKind::CodeBlock(CodeBlock { language: None, .. })
        ));
    }

    #[test]
    fn unknown_type_is_fatal() {
        let value = json!({ "type": "widget", "version": 2 });
        assert!(matches!(
            decode_spec(&value),
            Err(SchemaError::UnknownType(name)) if name == "widget"
        ));
    }

    #[test]
    fn newer_version_is_rejected() {
        let value = json!({ "type": "paragraph", "version": 99 });
        assert!(matches!(
            decode_spec(&value),
            Err(SchemaError::UnsupportedVersion { version: 99, .. })
        ));
    }

    #[test]
    fn transient_children_are_omitted() {
        let spec = NodeSpec::with_children(
            NodeKind::Paragraph,
            vec![
                NodeSpec::text("kept"),
                NodeSpec::new(NodeKind::SearchMatch(SearchMatch { current: false })),
                NodeSpec::new(NodeKind::Completion(Completion { text: "ghost".into() })),
            ],
        );
        let value = encode_spec(&spec);
        let children = value["children"].as_array().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0]["type"], "text");
    }
}
