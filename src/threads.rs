//! Reply-tree reconstruction from flat parent-pointer rows.
//!
//! Two linear passes over an in-memory arena: index by id, then link
//! children by position. No recursive store queries, no N+1.

use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::Comment;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentNode {
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

// Drop glue for a nested struct is recursive; flatten it so a very deep
// reply chain cannot exhaust the stack on teardown.
impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.replies);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.replies);
        }
    }
}

/// Assemble the display forest for one content item.
///
/// Roots and each reply list are ordered by `created_at` ascending, with the
/// input order breaking ties. A reply whose parent is absent from the input
/// becomes a root rather than being dropped. Corrupted parent chains that
/// never reach a root (cycles) are surfaced the same way instead of looping.
pub fn build_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let index: HashMap<&str, usize> = comments
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); comments.len()];
    let mut roots: Vec<usize> = Vec::new();
    for (i, c) in comments.iter().enumerate() {
        match c.parent_id.as_deref().and_then(|p| index.get(p)).copied() {
            Some(p) if p != i => children[p].push(i),
            _ => roots.push(i),
        }
    }

    // stable sort: equal timestamps keep submission order
    roots.sort_by_key(|&i| comments[i].created_at);
    for list in &mut children {
        list.sort_by_key(|&i| comments[i].created_at);
    }

    let mut slots: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    let mut forest: Vec<CommentNode> = roots
        .into_iter()
        .filter_map(|r| assemble(r, &children, &mut slots))
        .collect();
    // anything still unconsumed sits on a cycle; promote in input order
    for i in 0..slots.len() {
        if let Some(node) = assemble(i, &children, &mut slots) {
            forest.push(node);
        }
    }
    forest
}

// Each slot is consumed at most once, so a corrupt back-edge simply finds an
// empty slot and stops. Assembly uses an explicit work stack: reply chains
// can be arbitrarily deep, so tree depth must not map onto call-stack depth.
fn assemble(
    root: usize,
    children: &[Vec<usize>],
    slots: &mut [Option<Comment>],
) -> Option<CommentNode> {
    let comment = slots[root].take()?;
    // (node under construction, its input index, next child position)
    let mut stack = vec![(CommentNode { comment, replies: Vec::new() }, root, 0usize)];
    loop {
        let top = stack.last_mut().unwrap();
        let idx = top.1;
        if top.2 < children[idx].len() {
            let child = children[idx][top.2];
            top.2 += 1;
            if let Some(comment) = slots[child].take() {
                stack.push((CommentNode { comment, replies: Vec::new() }, child, 0));
            }
        } else {
            let (node, _, _) = stack.pop().unwrap();
            match stack.last_mut() {
                Some((parent, _, _)) => parent.replies.push(node),
                None => return Some(node),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommentStatus;
    use chrono::{Duration, TimeZone, Utc};

    fn comment(id: &str, parent: Option<&str>, offset_secs: i64) -> Comment {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Comment {
            id: id.into(),
            content_id: "c1".into(),
            parent_id: parent.map(Into::into),
            author_name: "Bob".into(),
            author_email: "bob@example.com".into(),
            body: format!("comment {id}"),
            status: CommentStatus::Approved,
            created_at: t0 + Duration::seconds(offset_secs),
            updated_at: t0 + Duration::seconds(offset_secs),
        }
    }

    fn count(forest: &[CommentNode]) -> usize {
        forest.iter().map(|n| 1 + count(&n.replies)).sum()
    }

    #[test]
    fn orphaned_reply_becomes_a_root() {
        // submitted in order A, C (parent missing), B (reply to A)
        let input = vec![
            comment("a", None, 0),
            comment("c", Some("ghost"), 1),
            comment("b", Some("a"), 2),
        ];
        let forest = build_tree(input);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].comment.id, "a");
        assert_eq!(forest[1].comment.id, "c");
        assert_eq!(forest[0].replies.len(), 1);
        assert_eq!(forest[0].replies[0].comment.id, "b");
    }

    #[test]
    fn node_count_is_preserved() {
        let input = vec![
            comment("a", None, 0),
            comment("b", Some("a"), 5),
            comment("c", Some("b"), 10),
            comment("d", Some("missing"), 2),
            comment("e", None, 1),
        ];
        let forest = build_tree(input);
        assert_eq!(count(&forest), 5);
    }

    #[test]
    fn ordering_is_created_at_ascending() {
        let input = vec![
            comment("late", None, 100),
            comment("early", None, 1),
            comment("mid", None, 50),
        ];
        let ids: Vec<_> = build_tree(input)
            .iter()
            .map(|n| n.comment.id.clone())
            .collect();
        assert_eq!(ids, ["early", "mid", "late"]);
    }

    #[test]
    fn equal_timestamps_keep_input_order() {
        let input = vec![
            comment("first", None, 0),
            comment("second", None, 0),
            comment("third", None, 0),
        ];
        let ids: Vec<_> = build_tree(input)
            .iter()
            .map(|n| n.comment.id.clone())
            .collect();
        assert_eq!(ids, ["first", "second", "third"]);
    }

    #[test]
    fn replies_are_ordered_within_their_parent() {
        let input = vec![
            comment("root", None, 0),
            comment("r2", Some("root"), 20),
            comment("r1", Some("root"), 10),
        ];
        let forest = build_tree(input);
        let ids: Vec<_> = forest[0].replies.iter().map(|n| n.comment.id.clone()).collect();
        assert_eq!(ids, ["r1", "r2"]);
    }

    #[test]
    fn deep_nesting_is_unbounded() {
        let input = vec![
            comment("a", None, 0),
            comment("b", Some("a"), 1),
            comment("c", Some("b"), 2),
            comment("d", Some("c"), 3),
        ];
        let forest = build_tree(input);
        assert_eq!(forest.len(), 1);
        assert_eq!(
            forest[0].replies[0].replies[0].replies[0].comment.id,
            "d"
        );
    }

    #[test]
    fn very_deep_reply_chains_do_not_overflow_the_stack() {
        let depth = 50_000;
        let mut input = Vec::with_capacity(depth);
        input.push(comment("n0", None, 0));
        for i in 1..depth {
            input.push(comment(
                &format!("n{i}"),
                Some(&format!("n{}", i - 1)),
                i as i64,
            ));
        }
        let forest = build_tree(input);
        assert_eq!(forest.len(), 1);

        let mut seen = 1;
        let mut node = &forest[0];
        while let Some(child) = node.replies.first() {
            node = child;
            seen += 1;
        }
        assert_eq!(seen, depth);
    }

    #[test]
    fn parent_cycle_terminates_and_keeps_all_nodes() {
        // corrupted data: a and b point at each other, c points at itself
        let input = vec![
            comment("a", Some("b"), 0),
            comment("b", Some("a"), 1),
            comment("c", Some("c"), 2),
        ];
        let forest = build_tree(input);
        assert_eq!(count(&forest), 3);
    }
}
