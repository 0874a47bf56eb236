//! Diff node conversion and accept/reject operations.
//!
//! A diff wrapper holds an author, a label, and two children: the proposed
//! insertion (kept as markdown source, parsed on accept) and the preserved
//! original content (kept as tree nodes so rejection restores it verbatim).

use super::tags;
use super::{BlockReplacement, ElementRule, ExportCtx, ImportCtx, RuleSet, parse_to_specs};
use crate::node::{Diff, DiffInsert, Node, NodeKey, NodeKind, NodeKindTag, NodeSpec};
use crate::tree::{DocTree, TreeError};

const DIFF: &str = "m-diff";
const INSERT: &str = "m-diff-insert";
const DELETE: &str = "m-diff-delete";

/// Lossless tagged diff form.
pub struct DiffTagRule;

impl DiffTagRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DiffTagRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRule for DiffTagRule {
    fn name(&self) -> &'static str {
        "diff-tag"
    }

    fn export(&self, ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        let NodeKind::Diff(diff) = &node.kind else {
            return None;
        };
        let mut lines = vec![format!(
            "{}{}",
            tags::open(DIFF),
            tags::encode_payload(diff, &node.state)
        )];
        for &child_key in &node.children {
            let Some(child) = ctx.tree.get(child_key) else {
                continue;
            };
            match &child.kind {
                NodeKind::DiffInsert(insert) => {
                    lines.push(tags::open(INSERT));
                    if !insert.markdown.is_empty() {
                        lines.push(insert.markdown.clone());
                    }
                    lines.push(tags::close(INSERT));
                }
                NodeKind::DiffDelete => {
                    lines.push(tags::open(DELETE));
                    let body = ctx.export_blocks(&child.children);
                    if !body.is_empty() {
                        lines.push(body);
                    }
                    lines.push(tags::close(DELETE));
                }
                _ => {}
            }
        }
        lines.push(tags::close(DIFF));
        Some(lines.join("\n"))
    }

    fn replace(
        &self,
        ctx: &ImportCtx<'_>,
        lines: &[&str],
        at: usize,
    ) -> Option<BlockReplacement> {
        let block = tags::parse_tag_block(lines, at, DIFF)?;
        let payload = block.payload?;
        if payload.len() > ctx.limits().max_tag_payload_bytes {
            tracing::warn!(rule = "diff-tag", "tag payload over limit; left as text");
            return None;
        }
        let (diff, state): (Diff, _) = match tags::decode_payload(payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::warn!(rule = "diff-tag", %err, "malformed payload; left as text");
                return None;
            }
        };

        let mut children = Vec::new();
        let mut index = skip_blank(&block.body, 0);
        let insert_block = tags::parse_tag_block(&block.body, index, INSERT)?;
        children.push(NodeSpec::new(NodeKind::DiffInsert(DiffInsert {
            markdown: insert_block.body.join("\n"),
        })));
        index = skip_blank(&block.body, index + insert_block.consumed);

        if index < block.body.len() {
            let delete_block = tags::parse_tag_block(&block.body, index, DELETE)?;
            let restored = ctx.nested().parse_blocks(&delete_block.body);
            children.push(NodeSpec::with_children(NodeKind::DiffDelete, restored));
            index = skip_blank(&block.body, index + delete_block.consumed);
        }
        if index < block.body.len() {
            // Stray content inside the wrapper: invalid structure.
            return None;
        }

        Some(BlockReplacement {
            consumed: block.consumed,
            specs: vec![NodeSpec::with_children(NodeKind::Diff(diff), children).with_state(state)],
        })
    }
}

fn skip_blank(lines: &[&str], mut index: usize) -> usize {
    while index < lines.len() && lines[index].trim().is_empty() {
        index += 1;
    }
    index
}

fn diff_parts(
    tree: &DocTree,
    key: NodeKey,
) -> Result<(NodeKey, usize, Option<String>, Option<NodeKey>), TreeError> {
    let node = tree.node(key)?;
    if node.kind.tag() != NodeKindTag::Diff {
        return Err(TreeError::UnexpectedKind {
            key,
            expected: NodeKindTag::Diff,
        });
    }
    let parent = node.parent.ok_or(TreeError::StaleKey(key))?;
    let index = tree
        .children(parent)
        .iter()
        .position(|child| *child == key)
        .unwrap_or(0);

    let mut insertion = None;
    let mut deletion = None;
    for &child in &node.children {
        match tree.get(child).map(|n| &n.kind) {
            Some(NodeKind::DiffInsert(insert)) => insertion = Some(insert.markdown.clone()),
            Some(NodeKind::DiffDelete) => deletion = Some(child),
            _ => {}
        }
    }
    Ok((parent, index, insertion, deletion))
}

/// Accepts a proposed change: the stored insertion markdown is parsed back
/// into content which replaces the diff wrapper in place. Returns the
/// inserted keys; the last one is where the selection should land.
pub fn accept_diff(
    tree: &mut DocTree,
    key: NodeKey,
    set: &RuleSet,
) -> Result<Vec<NodeKey>, TreeError> {
    let (parent, index, insertion, _) = diff_parts(tree, key)?;
    let registry = tree.registry().clone();
    let specs = parse_to_specs(&registry, insertion.as_deref().unwrap_or_default(), set);
    tree.update(|txn| {
        txn.remove(key)?;
        let mut keys = Vec::new();
        for (offset, spec) in specs.into_iter().enumerate() {
            keys.push(txn.insert_spec(parent, Some(index + offset), spec)?);
        }
        Ok(keys)
    })
}

/// Rejects a proposed change: the preserved original children replace the
/// wrapper verbatim and the insertion payload is discarded. A diff with no
/// deletion payload is simply removed.
pub fn reject_diff(tree: &mut DocTree, key: NodeKey) -> Result<Vec<NodeKey>, TreeError> {
    let (parent, index, _, deletion) = diff_parts(tree, key)?;
    let restored_keys: Vec<NodeKey> = deletion
        .map(|deletion| tree.children(deletion).to_vec())
        .unwrap_or_default();
    tree.update(|txn| {
        for (offset, &child) in restored_keys.iter().enumerate() {
            txn.move_node(child, parent, Some(index + offset))?;
        }
        txn.remove(key)?;
        Ok(restored_keys)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::TextRun;
    use crate::registry::Profile;
    use crate::transform::{RuleSet, import_markdown};

    fn tree_with_diff(insertion: &str, original: Option<&str>) -> (DocTree, NodeKey) {
        let mut tree = DocTree::new(Profile::Full, 1);
        let root = tree.root();
        let diff = tree.update(|txn| {
            let diff = txn
                .append(
                    root,
                    NodeKind::Diff(Diff {
                        author_id: "assistant".into(),
                        label: "proposed edit".into(),
                    }),
                )
                .unwrap();
            txn.append(
                diff,
                NodeKind::DiffInsert(DiffInsert {
                    markdown: insertion.to_string(),
                }),
            )
            .unwrap();
            if let Some(original) = original {
                let delete = txn.append(diff, NodeKind::DiffDelete).unwrap();
                let para = txn.append(delete, NodeKind::Paragraph).unwrap();
                txn.append(para, NodeKind::text(original)).unwrap();
            }
            diff
        });
        (tree, diff)
    }

    #[test]
    fn reject_restores_original_content() {
        let (mut tree, diff) = tree_with_diff("new text", Some("old text"));
        let root = tree.root();

        let restored = reject_diff(&mut tree, diff).unwrap();
        assert_eq!(restored.len(), 1);
        assert!(tree.get(diff).is_none(), "wrapper removed");

        let children = tree.children(root).to_vec();
        assert_eq!(children, restored);
        let para = tree.node(children[0]).unwrap();
        assert_eq!(para.kind.tag(), NodeKindTag::Paragraph);
        let text = tree.node(para.children[0]).unwrap();
        assert_eq!(
            text.kind,
            NodeKind::Text(TextRun {
                text: "old text".into()
            })
        );
    }

    #[test]
    fn reject_without_deletion_removes_the_diff() {
        let (mut tree, diff) = tree_with_diff("new text", None);
        let restored = reject_diff(&mut tree, diff).unwrap();
        assert!(restored.is_empty());
        assert!(tree.get(diff).is_none());
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn accept_replaces_wrapper_with_parsed_insertion() {
        let (mut tree, diff) = tree_with_diff("accepted one\n\naccepted two", Some("old"));
        let set = RuleSet::internal();

        let inserted = accept_diff(&mut tree, diff, &set).unwrap();
        assert_eq!(inserted.len(), 2);
        assert!(tree.get(diff).is_none());

        let root = tree.root();
        let children = tree.children(root).to_vec();
        assert_eq!(children, inserted);
        let first = tree.spec_of(children[0]).unwrap();
        assert_eq!(first.plain_text(), "accepted one");
    }

    #[test]
    fn accept_on_non_diff_is_an_error() {
        let mut tree = DocTree::new(Profile::Full, 1);
        let root = tree.root();
        let para = tree.update(|txn| txn.append(root, NodeKind::Paragraph).unwrap());
        let set = RuleSet::internal();
        assert!(matches!(
            accept_diff(&mut tree, para, &set),
            Err(TreeError::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn diff_tag_round_trip() {
        let mut tree = DocTree::new(Profile::Full, 1);
        let root = tree.root();
        let set = RuleSet::internal();
        let text = "<m-diff>{\"authorId\":\"assistant\",\"label\":\"edit\"}\n<m-diff-insert>\nnew body\n</m-diff-insert>\n<m-diff-delete>\nold body\n</m-diff-delete>\n</m-diff>";
        import_markdown(&mut tree, root, text, &set).unwrap();

        let diff_key = tree.children(root)[0];
        let node = tree.node(diff_key).unwrap();
        assert_eq!(node.kind.tag(), NodeKindTag::Diff);
        assert_eq!(node.children.len(), 2);

        let exported = crate::transform::export_tree(&tree, &set);
        assert!(exported.contains("<m-diff-insert>\nnew body\n</m-diff-insert>"));
        assert!(exported.contains("old body"));
    }

    #[test]
    fn malformed_diff_payload_stays_text() {
        let mut tree = DocTree::new(Profile::Full, 1);
        let root = tree.root();
        let set = RuleSet::internal();
        let text = "<m-diff>{\"label\":\"missing author\"}\n<m-diff-insert>\nx\n</m-diff-insert>\n</m-diff>";
        import_markdown(&mut tree, root, text, &set).unwrap();
        let children = tree.children(root).to_vec();
        assert!(
            children
                .iter()
                .all(|key| tree.node(*key).unwrap().kind.tag() == NodeKindTag::Paragraph)
        );
    }
}
