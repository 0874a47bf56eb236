//! Import-direction behavior: degradation, reconciliation, boundary
//! rejection, profile fallbacks and schema loading.

use md_nodetree::{
    DocTree, NodeKind, NodeKindTag, Profile, RuleSet, TextRun, transform,
};
use serde_json::json;

fn kinds_under_root(tree: &DocTree) -> Vec<NodeKindTag> {
    tree.children(tree.root())
        .iter()
        .map(|&key| tree.node(key).unwrap().kind.tag())
        .collect()
}

mod malformed_payloads {
    use super::*;

    #[test]
    fn user_mention_missing_required_field_stays_literal() {
        let set = RuleSet::internal();
        let input = r#"<m-user-mention>{"email":"a@b.com"}</m-user-mention>"#;
        let tree = transform::import_document(Profile::Full, 1, input, &set).unwrap();

        assert_eq!(kinds_under_root(&tree), vec![NodeKindTag::Paragraph]);
        let para = tree.children(tree.root())[0];
        let spec = tree.spec_of(para).unwrap();
        assert_eq!(spec.children.len(), 1);
        assert_eq!(
            spec.children[0].kind,
            NodeKind::Text(TextRun {
                text: input.to_string()
            }),
            "no partial node; the literal tag text is preserved"
        );
    }

    #[test]
    fn broken_json_stays_literal() {
        let set = RuleSet::internal();
        let input = r#"<m-equation>{not json}</m-equation>"#;
        let tree = transform::import_document(Profile::Full, 1, input, &set).unwrap();
        let spec = tree.spec_of(tree.root()).unwrap();
        assert_eq!(spec.plain_text(), input);
    }
}

mod table_reconciliation {
    use super::*;

    #[test]
    fn differing_column_counts_pad_to_widest() {
        let set = RuleSet::external();
        let input = "| a | b | c |\n| d | e | f |\n| g | h | i | j | k |";
        let tree = transform::import_document(Profile::Full, 1, input, &set).unwrap();

        assert_eq!(kinds_under_root(&tree), vec![NodeKindTag::Table]);
        let table = tree.children(tree.root())[0];
        let rows = tree.children(table).to_vec();
        assert_eq!(rows.len(), 3);
        for row in rows {
            assert_eq!(tree.children(row).len(), 5);
        }
    }

    #[test]
    fn padded_cells_are_empty() {
        let set = RuleSet::external();
        let input = "| a |\n| b | c |";
        let tree = transform::import_document(Profile::Full, 1, input, &set).unwrap();
        let table = tree.children(tree.root())[0];
        let first_row = tree.children(table)[0];
        let cells = tree.children(first_row).to_vec();
        assert_eq!(cells.len(), 2);
        assert!(tree.children(cells[1]).is_empty());
    }
}

mod equation_boundaries {
    use super::*;

    #[test]
    fn opener_sharing_its_line_with_text_is_rejected() {
        let set = RuleSet::external();
        let input = "foo $$\nE = mc^2\n$$";
        let tree = transform::import_document(Profile::Full, 1, input, &set).unwrap();
        let kinds = kinds_under_root(&tree);
        assert!(
            kinds.iter().all(|tag| *tag == NodeKindTag::Paragraph),
            "boundary text must leave raw paragraphs, got {kinds:?}"
        );
    }

    #[test]
    fn clean_fence_is_accepted() {
        let set = RuleSet::external();
        let tree =
            transform::import_document(Profile::Full, 1, "$$\nE = mc^2\n$$", &set).unwrap();
        assert_eq!(kinds_under_root(&tree), vec![NodeKindTag::Equation]);
    }
}

mod profile_fallbacks {
    use super::*;

    #[test]
    fn chat_profile_degrades_internal_table_text() {
        let set = RuleSet::internal();
        let input = "<m-table>\n<m-tr>\n<m-td>\na\n</m-td>\n<m-td>\nb\n</m-td>\n</m-tr>\n</m-table>";
        let tree = transform::import_document(Profile::Chat, 1, input, &set).unwrap();
        let kinds = kinds_under_root(&tree);
        assert_eq!(kinds, vec![NodeKindTag::Paragraph]);
        let spec = tree.spec_of(tree.root()).unwrap();
        assert_eq!(spec.plain_text(), "| a | b |");
    }

    #[test]
    fn chat_profile_degrades_media_to_url_text() {
        let set = RuleSet::internal();
        let input = r#"<m-media>{"media":"image","source":"external","url":"https://e.com/x.png"}</m-media>"#;
        let tree = transform::import_document(Profile::Chat, 1, input, &set).unwrap();
        let spec = tree.spec_of(tree.root()).unwrap();
        assert_eq!(spec.plain_text(), "https://e.com/x.png");
    }

    #[test]
    fn title_profile_keeps_mentions_inline() {
        let set = RuleSet::internal();
        let input = r#"hello <m-user-mention>{"userId":"u1","label":"Ada"}</m-user-mention>"#;
        let tree = transform::import_document(Profile::Title, 1, input, &set).unwrap();
        let kinds = kinds_under_root(&tree);
        assert_eq!(kinds, vec![NodeKindTag::Text, NodeKindTag::UserMention]);
    }

    #[test]
    fn plain_profile_keeps_code_blocks() {
        let set = RuleSet::internal();
        let tree = transform::import_document(
            Profile::Plain,
            1,
            "```rust\nfn x() {}\n```",
            &set,
        )
        .unwrap();
        assert_eq!(kinds_under_root(&tree), vec![NodeKindTag::CodeBlock]);
    }
}

mod schema_loading {
    use super::*;

    #[test]
    fn legacy_code_envelope_migrates_on_load() {
        let value = json!({
            "type": "root",
            "version": 2,
            "children": [
                { "type": "code", "version": 1, "source": "rust\nfn main() {}" }
            ]
        });
        let tree = DocTree::load_schema(Profile::Full, 1, &value).unwrap();
        let code = tree.children(tree.root())[0];
        match &tree.node(code).unwrap().kind {
            NodeKind::CodeBlock(code) => {
                assert_eq!(code.language.as_deref(), Some("rust"));
                assert_eq!(code.code, "fn main() {}");
            }
            other => panic!("expected migrated code block, got {other:?}"),
        }
    }

    #[test]
    fn schema_state_container_survives_save_load() {
        let set = RuleSet::internal();
        let mut tree = transform::import_document(
            Profile::Full,
            7,
            r#"<m-user-mention>{"userId":"u1","label":"Ada"}</m-user-mention>"#,
            &set,
        )
        .unwrap();
        let mention = tree
            .walk()
            .into_iter()
            .find(|&key| tree.node(key).unwrap().kind.tag() == NodeKindTag::UserMention)
            .unwrap();
        tree.add_shared_peer(mention, 8).unwrap();
        let id = tree.id_of(mention).unwrap();

        let value = tree.to_schema();
        let loaded = DocTree::load_schema(Profile::Full, 8, &value).unwrap();
        let restored = loaded.resolve_id(&id).expect("durable id survives");
        let state = &loaded.node(restored).unwrap().state;
        assert_eq!(state.peer_id, Some(7));
        assert_eq!(state.shared_peer_ids, vec![8]);
        // Derived locally for the *new* session peer.
        assert_eq!(state.local, Some(true));
    }

    #[test]
    fn unknown_schema_type_is_fatal() {
        let value = json!({
            "type": "root",
            "version": 2,
            "children": [ { "type": "hologram", "version": 2 } ]
        });
        assert!(DocTree::load_schema(Profile::Full, 1, &value).is_err());
    }
}

mod search_and_completion {
    use super::*;
    use md_nodetree::{clear_matches, highlight_matches};

    #[test]
    fn highlights_do_not_leak_into_exports() {
        let internal = RuleSet::internal();
        let mut tree =
            transform::import_document(Profile::Full, 1, "alpha beta alpha", &internal).unwrap();
        let count = highlight_matches(&mut tree, "alpha").unwrap();
        assert_eq!(count, 2);

        // Transient highlight nodes flatten away on export and on save.
        assert_eq!(transform::export_tree(&tree, &internal), "alpha beta alpha");
        let value = tree.to_schema();
        let loaded = DocTree::load_schema(Profile::Full, 1, &value).unwrap();
        assert!(
            loaded
                .walk()
                .into_iter()
                .all(|key| loaded.node(key).unwrap().kind.tag() != NodeKindTag::SearchMatch)
        );

        clear_matches(&mut tree).unwrap();
        assert_eq!(transform::export_tree(&tree, &internal), "alpha beta alpha");
    }
}
