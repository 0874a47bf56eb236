//! Round-trip tests for the internal rule set.
//!
//! For every supported node variant, import(export(tree)) must reproduce the
//! tree: structural equality on variant-specific fields, ephemeral keys
//! excluded, durable ids preserved for tag-carrying kinds.

use md_nodetree::{
    BlockTag, ClassedBlock, CommentMark, Diff, DiffInsert, DocTree, Equation, Media, MediaSource,
    NodeId, NodeKind, NodeKindTag, NodeSpec, Profile, RuleSet, transform,
};

fn assert_same_shape(a: &NodeSpec, b: &NodeSpec) {
    assert_eq!(a.kind, b.kind, "variant fields must survive the round trip");
    assert_eq!(
        a.children.len(),
        b.children.len(),
        "child count mismatch under {:?}",
        a.kind.tag()
    );
    for (left, right) in a.children.iter().zip(&b.children) {
        assert_same_shape(left, right);
    }
}

/// Kinds whose markdown form is a tag carrying the reserved state payload.
const ID_CARRYING: &[NodeKindTag] = &[
    NodeKindTag::UserMention,
    NodeKindTag::ContactMention,
    NodeKindTag::DocumentMention,
    NodeKindTag::DateMention,
    NodeKindTag::Equation,
    NodeKindTag::Table,
    NodeKindTag::TableRow,
    NodeKindTag::TableCell,
    NodeKindTag::Media,
    NodeKindTag::ClassedBlock,
    NodeKindTag::CommentMark,
    NodeKindTag::Diff,
];

fn collect_ids(spec: &NodeSpec, out: &mut Vec<(NodeKindTag, Option<NodeId>)>) {
    let tag = spec.kind.tag();
    if ID_CARRYING.contains(&tag) {
        out.push((tag, spec.state.id));
    }
    for child in &spec.children {
        collect_ids(child, out);
    }
}

/// import -> export -> import -> export must be stable, structurally equal,
/// and id-preserving for custom variants.
fn assert_internal_round_trip(markdown: &str) {
    let set = RuleSet::internal();
    let first = transform::import_document(Profile::Full, 1, markdown, &set).unwrap();
    let once = transform::export_tree(&first, &set);
    let second = transform::import_document(Profile::Full, 1, &once, &set).unwrap();
    let twice = transform::export_tree(&second, &set);

    assert_eq!(
        once, twice,
        "round trip not idempotent for input:\n{markdown:?}"
    );

    let spec_a = first.spec_of(first.root()).unwrap();
    let spec_b = second.spec_of(second.root()).unwrap();
    assert_same_shape(&spec_a, &spec_b);

    let mut ids_a = Vec::new();
    let mut ids_b = Vec::new();
    collect_ids(&spec_a, &mut ids_a);
    collect_ids(&spec_b, &mut ids_b);
    assert_eq!(ids_a, ids_b, "durable ids must survive the round trip");
}

mod mentions {
    use super::*;

    #[test]
    fn user_mention() {
        assert_internal_round_trip(
            r#"ping <m-user-mention>{"userId":"u1","label":"Ada","email":"ada@e.com"}</m-user-mention> now"#,
        );
    }

    #[test]
    fn contact_mention() {
        assert_internal_round_trip(
            r#"<m-contact-mention>{"contactId":"c1","label":"Bob"}</m-contact-mention>"#,
        );
    }

    #[test]
    fn document_mention_with_params() {
        assert_internal_round_trip(
            r#"see <m-doc-mention>{"documentId":"d1","label":"Q3 Plan","blockType":"summary","params":{"depth":"2"}}</m-doc-mention>"#,
        );
    }

    #[test]
    fn date_mention() {
        assert_internal_round_trip(
            r#"due <m-date-mention>{"date":"2026-08-06","label":"tomorrow"}</m-date-mention>"#,
        );
    }

    #[test]
    fn two_mentions_in_one_line() {
        assert_internal_round_trip(
            r#"<m-user-mention>{"userId":"u1","label":"Ada"}</m-user-mention> and <m-user-mention>{"userId":"u2","label":"Bob"}</m-user-mention>"#,
        );
    }
}

mod equations {
    use super::*;

    #[test]
    fn inline_equation() {
        assert_internal_round_trip(
            r#"energy is <m-equation>{"source":"E=mc^2","inline":true}</m-equation> indeed"#,
        );
    }

    #[test]
    fn block_equation() {
        assert_internal_round_trip(
            r#"<m-equation>{"source":"\\sum_i x_i","inline":false}</m-equation>"#,
        );
    }
}

mod tables {
    use super::*;

    #[test]
    fn simple_table() {
        assert_internal_round_trip(
            "<m-table>\n<m-tr>\n<m-td>\na\n</m-td>\n<m-td>\nb\n</m-td>\n</m-tr>\n</m-table>",
        );
    }

    #[test]
    fn table_cell_with_mention() {
        assert_internal_round_trip(
            "<m-table>\n<m-tr>\n<m-td>\n<m-user-mention>{\"userId\":\"u1\",\"label\":\"Ada\"}</m-user-mention>\n</m-td>\n</m-tr>\n</m-table>",
        );
    }

    #[test]
    fn table_cell_with_equation_block() {
        assert_internal_round_trip(
            "<m-table>\n<m-tr>\n<m-td>\n<m-equation>{\"source\":\"x\",\"inline\":false}</m-equation>\n</m-td>\n</m-tr>\n</m-table>",
        );
    }

    #[test]
    fn multi_row_table() {
        assert_internal_round_trip(
            "<m-table>\n<m-tr>\n<m-td>\n1\n</m-td>\n</m-tr>\n<m-tr>\n<m-td>\n2\n</m-td>\n</m-tr>\n</m-table>",
        );
    }
}

mod containers {
    use super::*;

    #[test]
    fn classed_block() {
        assert_internal_round_trip(
            "<m-classed>{\"tag\":\"blockquote\",\"classes\":[\"quoted-reply\"]}\nquoted text\n</m-classed>",
        );
    }

    #[test]
    fn nested_classed_blocks() {
        assert_internal_round_trip(
            "<m-classed>{\"tag\":\"section\",\"classes\":[\"grouped-attachments\"]}\n<m-classed>{\"tag\":\"div\"}\ninner\n</m-classed>\n</m-classed>",
        );
    }

    #[test]
    fn comment_mark() {
        assert_internal_round_trip(
            r#"<m-comment>{"commentId":"c-9"}disputed claim</m-comment>"#,
        );
    }
}

mod media {
    use super::*;

    #[test]
    fn image_with_dimensions() {
        assert_internal_round_trip(
            r#"<m-media>{"media":"image","source":"attachment","refId":"att-1","url":"https://e.com/a.png","width":640,"height":480}</m-media>"#,
        );
    }

    #[test]
    fn video() {
        assert_internal_round_trip(
            r#"<m-media>{"media":"video","source":"external","url":"https://e.com/v.mp4"}</m-media>"#,
        );
    }
}

mod diffs {
    use super::*;

    #[test]
    fn diff_with_both_payloads() {
        assert_internal_round_trip(
            "<m-diff>{\"authorId\":\"assistant\",\"label\":\"rewrite\"}\n<m-diff-insert>\nproposed text\n</m-diff-insert>\n<m-diff-delete>\noriginal text\n</m-diff-delete>\n</m-diff>",
        );
    }

    #[test]
    fn diff_without_deletion() {
        assert_internal_round_trip(
            "<m-diff>{\"authorId\":\"assistant\",\"label\":\"add\"}\n<m-diff-insert>\nnew paragraph\n</m-diff-insert>\n</m-diff>",
        );
    }
}

mod plain_blocks {
    use super::*;

    #[test]
    fn paragraphs() {
        assert_internal_round_trip("first paragraph\n\nsecond paragraph");
    }

    #[test]
    fn code_fence() {
        assert_internal_round_trip("```rust\nfn main() {}\n```");
    }

    #[test]
    fn horizontal_rule() {
        assert_internal_round_trip("above\n\n---\n\nbelow");
    }

    #[test]
    fn mixed_document() {
        assert_internal_round_trip(
            "intro with <m-user-mention>{\"userId\":\"u1\",\"label\":\"Ada\"}</m-user-mention>\n\n---\n\n```py\nprint(1)\n```\n\n<m-equation>{\"source\":\"x+y\",\"inline\":false}</m-equation>",
        );
    }
}

mod programmatic {
    use super::*;

    #[test]
    fn built_tree_survives_export_import() {
        let mut tree = DocTree::new(Profile::Full, 3);
        let root = tree.root();
        tree.update(|txn| {
            let classed = txn
                .append(
                    root,
                    NodeKind::ClassedBlock(ClassedBlock {
                        tag: BlockTag::Div,
                        classes: vec!["wrapper".into()],
                    }),
                )
                .unwrap();
            let para = txn.append(classed, NodeKind::Paragraph).unwrap();
            txn.append(para, NodeKind::text("inside ")).unwrap();
            txn.append(
                para,
                NodeKind::CommentMark(CommentMark {
                    comment_id: "c1".into(),
                    resolved: false,
                }),
            )
            .unwrap();
            txn.append(
                root,
                NodeKind::Media(Media::image(MediaSource::Attachment, "https://e.com/p.png")),
            )
            .unwrap();
            let diff = txn
                .append(
                    root,
                    NodeKind::Diff(Diff {
                        author_id: "a1".into(),
                        label: "edit".into(),
                    }),
                )
                .unwrap();
            txn.append(
                diff,
                NodeKind::DiffInsert(DiffInsert {
                    markdown: "replacement".into(),
                }),
            )
            .unwrap();
            txn.append(
                root,
                NodeKind::Equation(Equation {
                    source: "a^2+b^2".into(),
                    inline: false,
                }),
            )
            .unwrap();
        });

        let set = RuleSet::internal();
        let exported = transform::export_tree(&tree, &set);
        let reloaded = transform::import_document(Profile::Full, 3, &exported, &set).unwrap();

        let spec_a = tree.spec_of(tree.root()).unwrap();
        let spec_b = reloaded.spec_of(reloaded.root()).unwrap();
        assert_same_shape(&spec_a, &spec_b);

        let mut ids_a = Vec::new();
        let mut ids_b = Vec::new();
        collect_ids(&spec_a, &mut ids_a);
        collect_ids(&spec_b, &mut ids_b);
        assert_eq!(ids_a, ids_b);
    }
}

mod external_set {
    use super::*;

    #[test]
    fn mention_exports_as_display_text() {
        let internal = RuleSet::internal();
        let external = RuleSet::external();
        let tree = transform::import_document(
            Profile::Full,
            1,
            r#"ping <m-user-mention>{"userId":"u1","label":"Ada"}</m-user-mention>"#,
            &internal,
        )
        .unwrap();
        assert_eq!(transform::export_tree(&tree, &external), "ping Ada");
    }

    #[test]
    fn external_export_does_not_reimport_mentions() {
        let internal = RuleSet::internal();
        let external = RuleSet::external();
        let tree = transform::import_document(
            Profile::Full,
            1,
            r#"<m-user-mention>{"userId":"u1","label":"Ada"}</m-user-mention>"#,
            &internal,
        )
        .unwrap();
        let portable = transform::export_tree(&tree, &external);
        let back = transform::import_document(Profile::Full, 1, &portable, &external).unwrap();
        let spec = back.spec_of(back.root()).unwrap();
        let mut ids = Vec::new();
        collect_ids(&spec, &mut ids);
        assert!(
            ids.iter().all(|(tag, _)| *tag != NodeKindTag::UserMention),
            "portable markdown must not fabricate mention nodes"
        );
    }

    #[test]
    fn equation_exports_as_dollars() {
        let internal = RuleSet::internal();
        let external = RuleSet::external();
        let tree = transform::import_document(
            Profile::Full,
            1,
            r#"x is <m-equation>{"source":"x","inline":true}</m-equation>"#,
            &internal,
        )
        .unwrap();
        assert_eq!(transform::export_tree(&tree, &external), "x is $x$");
    }

    #[test]
    fn table_exports_as_pipes() {
        let internal = RuleSet::internal();
        let external = RuleSet::external();
        let tree = transform::import_document(
            Profile::Full,
            1,
            "<m-table>\n<m-tr>\n<m-td>\na\n</m-td>\n<m-td>\nb\n</m-td>\n</m-tr>\n<m-tr>\n<m-td>\nc\n</m-td>\n<m-td>\nd\n</m-td>\n</m-tr>\n</m-table>",
            &internal,
        )
        .unwrap();
        let exported = transform::export_tree(&tree, &external);
        assert_eq!(exported, "| a | b |\n| --- | --- |\n| c | d |");
    }

    #[test]
    fn pending_diff_exports_original_content() {
        let internal = RuleSet::internal();
        let external = RuleSet::external();
        let tree = transform::import_document(
            Profile::Full,
            1,
            "<m-diff>{\"authorId\":\"a\",\"label\":\"l\"}\n<m-diff-insert>\nnew\n</m-diff-insert>\n<m-diff-delete>\nold\n</m-diff-delete>\n</m-diff>",
            &internal,
        )
        .unwrap();
        assert_eq!(transform::export_tree(&tree, &external), "old");
    }
}

mod combined_set {
    use super::*;

    #[test]
    fn accepts_internal_tags_and_external_markdown_together() {
        let set = RuleSet::combined();
        let tree = transform::import_document(
            Profile::Full,
            1,
            "typed $a+b$ math and <m-user-mention>{\"userId\":\"u1\",\"label\":\"Ada\"}</m-user-mention>\n\n| x | y |\n| 1 | 2 |",
            &set,
        )
        .unwrap();
        let spec = tree.spec_of(tree.root()).unwrap();
        let mut tags = Vec::new();
        collect_ids(&spec, &mut tags);
        let tags: Vec<NodeKindTag> = tags.into_iter().map(|(tag, _)| tag).collect();
        assert!(tags.contains(&NodeKindTag::Equation));
        assert!(tags.contains(&NodeKindTag::UserMention));
        assert!(tags.contains(&NodeKindTag::Table));
    }
}
