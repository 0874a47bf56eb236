//! Search-match highlighting.
//!
//! Wraps query occurrences inside text runs with transient search-match
//! nodes. Matches must fall on grapheme cluster boundaries so a hit never
//! splits a user-perceived character.

use crate::node::{NodeKey, NodeKind, NodeKindTag, NodeSpec, SearchMatch};
use crate::tree::{DocTree, TreeError};
use std::collections::BTreeSet;
use unicode_segmentation::UnicodeSegmentation;

/// Highlights every occurrence of `query`, returning the match count. The
/// first match is flagged as current. Existing highlights are cleared first.
pub fn highlight_matches(tree: &mut DocTree, query: &str) -> Result<usize, TreeError> {
    clear_matches(tree)?;
    if query.is_empty() {
        return Ok(0);
    }

    struct Target {
        key: NodeKey,
        parent: NodeKey,
        index: usize,
        text: String,
        ranges: Vec<(usize, usize)>,
        /// Document-order index of this target's first match.
        first_match: usize,
    }

    let mut targets = Vec::new();
    let mut count = 0usize;
    for key in tree.walk() {
        let Some(node) = tree.get(key) else {
            continue;
        };
        let NodeKind::Text(run) = &node.kind else {
            continue;
        };
        let Some(parent) = node.parent else {
            continue;
        };
        let ranges = find_ranges(&run.text, query);
        if ranges.is_empty() {
            continue;
        }
        let index = tree
            .children(parent)
            .iter()
            .position(|child| *child == key)
            .unwrap_or(0);
        let first_match = count;
        count += ranges.len();
        targets.push(Target {
            key,
            parent,
            index,
            text: run.text.clone(),
            ranges,
            first_match,
        });
    }

    // Splice in reverse document order so earlier siblings' stored indices
    // stay valid while later siblings expand.
    tree.update(|txn| {
        for target in targets.into_iter().rev() {
            let mut specs = Vec::new();
            let mut cursor = 0;
            for (offset, (start, end)) in target.ranges.iter().copied().enumerate() {
                if start > cursor {
                    specs.push(NodeSpec::text(&target.text[cursor..start]));
                }
                specs.push(NodeSpec::with_children(
                    NodeKind::SearchMatch(SearchMatch {
                        current: target.first_match + offset == 0,
                    }),
                    vec![NodeSpec::text(&target.text[start..end])],
                ));
                cursor = end;
            }
            if cursor < target.text.len() {
                specs.push(NodeSpec::text(&target.text[cursor..]));
            }

            txn.remove(target.key)?;
            for (offset, spec) in specs.into_iter().enumerate() {
                txn.insert_spec(target.parent, Some(target.index + offset), spec)?;
            }
        }
        Ok::<(), TreeError>(())
    })?;
    Ok(count)
}

/// Removes every search-match node, flattening its text back in place.
pub fn clear_matches(tree: &mut DocTree) -> Result<usize, TreeError> {
    struct Target {
        key: NodeKey,
        parent: NodeKey,
        index: usize,
        text: String,
    }

    let mut targets = Vec::new();
    for key in tree.walk() {
        let Some(node) = tree.get(key) else {
            continue;
        };
        if node.kind.tag() != NodeKindTag::SearchMatch {
            continue;
        }
        let Some(parent) = node.parent else {
            continue;
        };
        let index = tree
            .children(parent)
            .iter()
            .position(|child| *child == key)
            .unwrap_or(0);
        let text = tree
            .spec_of(key)
            .map(|spec| spec.plain_text())
            .unwrap_or_default();
        targets.push(Target {
            key,
            parent,
            index,
            text,
        });
    }

    let cleared = targets.len();
    if cleared > 0 {
        tree.update(|txn| {
            for target in targets.into_iter().rev() {
                txn.remove(target.key)?;
                if !target.text.is_empty() {
                    txn.insert_spec(
                        target.parent,
                        Some(target.index),
                        NodeSpec::text(target.text),
                    )?;
                }
            }
            Ok::<(), TreeError>(())
        })?;
    }
    Ok(cleared)
}

/// Non-overlapping byte ranges of `query` in `text`, restricted to grapheme
/// cluster boundaries on both ends.
fn find_ranges(text: &str, query: &str) -> Vec<(usize, usize)> {
    let mut boundaries: BTreeSet<usize> = text.grapheme_indices(true).map(|(idx, _)| idx).collect();
    boundaries.insert(text.len());

    let mut ranges = Vec::new();
    let mut from = 0;
    while let Some(found) = text[from..].find(query) {
        let start = from + found;
        let end = start + query.len();
        if boundaries.contains(&start) && boundaries.contains(&end) {
            ranges.push((start, end));
            from = end;
        } else {
            from = start + 1;
            while from < text.len() && !text.is_char_boundary(from) {
                from += 1;
            }
        }
    }
    ranges
}
