use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::depth::DepthLimit;
use crate::model::{CommentRecord, SortMode};
use crate::sort;

/// A comment placed in its reply tree, plus the per-device view state that
/// goes with it.
///
/// Reply chains written straight to the backend can be arbitrarily deep, so
/// no pass over the tree recurses. That includes the trait impls below.
pub struct ThreadNode {
    pub comment: CommentRecord,
    /// Replies, in the order of the last sort.
    pub children: Vec<ThreadNode>,
    pub collapsed: bool,
    /// Whether this device has already liked the comment.
    pub liked: bool,
}

impl ThreadNode {
    pub fn new(comment: CommentRecord) -> Self {
        Self {
            comment,
            children: Vec::new(),
            collapsed: false,
            liked: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.comment.id
    }

    pub fn reply_count(&self) -> usize {
        self.children.len()
    }

    pub fn descendant_count(&self) -> usize {
        walk(&self.children).count()
    }

    fn shallow_clone(&self) -> Self {
        Self {
            comment: self.comment.clone(),
            children: Vec::with_capacity(self.children.len()),
            collapsed: self.collapsed,
            liked: self.liked,
        }
    }
}

impl Clone for ThreadNode {
    fn clone(&self) -> Self {
        let mut root = self.shallow_clone();
        // Copies in pre-order, each with the position of its parent copy
        // (`None` for children of the root).
        let mut copies: Vec<(ThreadNode, Option<usize>)> = Vec::new();
        let mut pending: Vec<(&ThreadNode, Option<usize>)> =
            self.children.iter().rev().map(|child| (child, None)).collect();
        while let Some((node, parent)) = pending.pop() {
            let position = copies.len();
            copies.push((node.shallow_clone(), parent));
            pending.extend(node.children.iter().rev().map(|child| (child, Some(position))));
        }
        // Popping from the back attaches every subtree after its own
        // children are complete; siblings arrive last-first.
        while let Some((mut node, parent)) = copies.pop() {
            node.children.reverse();
            match parent {
                Some(parent) => copies[parent].0.children.push(node),
                None => root.children.push(node),
            }
        }
        root.children.reverse();
        root
    }
}

impl fmt::Debug for ThreadNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadNode")
            .field("comment", &self.comment)
            .field("replies", &self.children.len())
            .field("collapsed", &self.collapsed)
            .field("liked", &self.liked)
            .finish()
    }
}

impl PartialEq for ThreadNode {
    fn eq(&self, other: &Self) -> bool {
        let mut left = vec![self];
        let mut right = vec![other];
        while let (Some(a), Some(b)) = (left.pop(), right.pop()) {
            if a.comment != b.comment
                || a.collapsed != b.collapsed
                || a.liked != b.liked
                || a.children.len() != b.children.len()
            {
                return false;
            }
            left.extend(&a.children);
            right.extend(&b.children);
        }
        true
    }
}

impl Eq for ThreadNode {}

impl Drop for ThreadNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Turns a flat batch of comments into reply trees.
///
/// All records are indexed first and linked second, so a reply may arrive
/// before its parent. When two records share an id the later one wins.
/// Replies whose parent is missing from the batch, or lives under a different
/// post, never reach a root and are dropped together with their own replies.
/// The returned roots are unordered; see [`sort::sort_forest`].
pub fn build_forest<I>(records: I) -> Vec<ThreadNode>
where
    I: IntoIterator<Item = CommentRecord>,
{
    let mut slots: Vec<Option<CommentRecord>> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();
    for record in records {
        if let Some(previous) = by_id.insert(record.id.clone(), slots.len()) {
            tracing::debug!(id = %record.id, "duplicate comment id, keeping the later record");
            slots[previous] = None;
        }
        slots.push(Some(record));
    }

    let mut roots = Vec::new();
    let mut replies: HashMap<usize, Vec<usize>> = HashMap::new();
    for (index, slot) in slots.iter().enumerate() {
        let Some(record) = slot else {
            continue;
        };
        let Some(parent_id) = record.parent_id.as_deref() else {
            roots.push(index);
            continue;
        };
        let parent = by_id.get(parent_id).copied().filter(|&parent| {
            slots[parent]
                .as_ref()
                .is_some_and(|p| p.post_id == record.post_id)
        });
        match parent {
            Some(parent) => replies.entry(parent).or_default().push(index),
            None => {
                tracing::debug!(id = %record.id, parent = parent_id, "dropping orphaned reply")
            }
        }
    }

    // Parents come before their replies in `order`, so walking it backwards
    // builds every subtree before the node that owns it. Cycles are never
    // reached from a root and are left out.
    let mut order = Vec::with_capacity(slots.len());
    let mut pending: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(index) = pending.pop() {
        order.push(index);
        if let Some(children) = replies.get(&index) {
            pending.extend(children.iter().rev());
        }
    }

    let mut built: HashMap<usize, ThreadNode> = HashMap::with_capacity(order.len());
    for &index in order.iter().rev() {
        let Some(record) = slots[index].take() else {
            continue;
        };
        let mut node = ThreadNode::new(record);
        node.children = replies
            .remove(&index)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|child| built.remove(&child))
            .collect();
        built.insert(index, node);
    }

    roots
        .into_iter()
        .filter_map(|index| built.remove(&index))
        .collect()
}

/// Builds, sorts and annotates a post's thread in one go.
pub fn build_sorted_tree(
    records: &[CommentRecord],
    mode: SortMode,
    liked: &HashSet<String>,
) -> Vec<ThreadNode> {
    let mut forest = build_forest(records.iter().cloned());
    sort::sort_forest(&mut forest, mode);
    mark_liked(&mut forest, liked);
    forest
}

pub fn mark_liked(nodes: &mut [ThreadNode], liked: &HashSet<String>) {
    for_each_mut(nodes, |node| node.liked = liked.contains(node.id()));
}

/// Returns a copy of `tree` where only the node `id` has its collapsed flag
/// flipped. Unknown ids leave the copy unchanged.
pub fn toggle_collapse(tree: &[ThreadNode], id: &str) -> Vec<ThreadNode> {
    let mut updated = tree.to_vec();
    for_each_mut(&mut updated, |node| {
        if node.id() == id {
            node.collapsed = !node.collapsed;
        }
    });
    updated
}

/// Ids of collapsed nodes, kept across rebuilds so a refresh or re-sort does
/// not unfold everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollapseSet {
    ids: HashSet<String>,
}

impl CollapseSet {
    pub fn from_tree(nodes: &[ThreadNode]) -> Self {
        Self {
            ids: walk(nodes)
                .filter(|(node, _)| node.collapsed)
                .map(|(node, _)| node.id().to_string())
                .collect(),
        }
    }

    pub fn apply(&self, nodes: &mut [ThreadNode]) {
        for_each_mut(nodes, |node| node.collapsed = self.ids.contains(node.id()));
    }

    /// Forgets ids that no longer name a node of `nodes`.
    pub fn retain_present(&mut self, nodes: &[ThreadNode]) {
        if self.ids.is_empty() {
            return;
        }
        let present: HashSet<&str> = walk(nodes).map(|(node, _)| node.id()).collect();
        self.ids.retain(|id| present.contains(id.as_str()));
    }

    /// Returns true when `id` is collapsed after the call.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

pub fn find<'a>(nodes: &'a [ThreadNode], id: &str) -> Option<&'a ThreadNode> {
    walk(nodes)
        .find(|(node, _)| node.id() == id)
        .map(|(node, _)| node)
}

/// Depth of `id` in the tree, roots being depth 0.
pub fn depth_of(nodes: &[ThreadNode], id: &str) -> Option<usize> {
    walk(nodes)
        .find(|(node, _)| node.id() == id)
        .map(|(_, depth)| depth)
}

pub fn count_nodes(nodes: &[ThreadNode]) -> usize {
    walk(nodes).count()
}

/// Pre-order traversal yielding each node with its depth.
pub fn walk(nodes: &[ThreadNode]) -> Walk<'_> {
    Walk {
        pending: nodes.iter().rev().map(|node| (node, 0)).collect(),
    }
}

pub struct Walk<'a> {
    pending: Vec<(&'a ThreadNode, usize)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (&'a ThreadNode, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth) = self.pending.pop()?;
        self.pending
            .extend(node.children.iter().rev().map(|child| (child, depth + 1)));
        Some((node, depth))
    }
}

/// Visits every node once, in no particular order.
fn for_each_mut(nodes: &mut [ThreadNode], mut visit: impl FnMut(&mut ThreadNode)) {
    let mut pending: Vec<&mut ThreadNode> = nodes.iter_mut().collect();
    while let Some(node) = pending.pop() {
        visit(&mut *node);
        pending.extend(node.children.iter_mut());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VisibleRow<'a> {
    pub node: &'a ThreadNode,
    pub depth: usize,
    pub can_reply: bool,
}

/// Flattens the tree in display order, hiding everything below a collapsed
/// node. Collapsed nodes themselves stay visible.
pub fn visible_rows(nodes: &[ThreadNode], limit: DepthLimit) -> Vec<VisibleRow<'_>> {
    let mut rows = Vec::new();
    let mut pending: Vec<(&ThreadNode, usize)> = nodes.iter().rev().map(|node| (node, 0)).collect();
    while let Some((node, depth)) = pending.pop() {
        rows.push(VisibleRow {
            node,
            depth,
            can_reply: limit.can_reply(depth),
        });
        if !node.collapsed {
            pending.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, parent: Option<&str>, t: i64, likes: u64) -> CommentRecord {
        CommentRecord {
            id: id.into(),
            post_id: "post-1".into(),
            parent_id: parent.map(str::to_string),
            author: "anon".into(),
            message: format!("message {id}"),
            created_at: Utc.timestamp_opt(t, 0).single().unwrap(),
            updated_at: None,
            likes,
        }
    }

    fn all_ids(nodes: &[ThreadNode]) -> Vec<String> {
        walk(nodes)
            .map(|(node, _)| node.id().to_string())
            .collect()
    }

    #[test]
    fn every_record_lands_exactly_once() {
        let records = vec![
            record("c", Some("b"), 130, 0),
            record("b", Some("a"), 120, 0),
            record("a", None, 100, 0),
            record("d", None, 140, 0),
            record("e", Some("a"), 150, 0),
        ];
        let forest = build_forest(records.clone());
        let mut seen = all_ids(&forest);
        seen.sort();
        let mut expected: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
        expected.sort();
        assert_eq!(seen, expected);
        assert_eq!(count_nodes(&forest), 5);
    }

    #[test]
    fn child_before_parent_is_linked() {
        let forest = build_forest(vec![record("reply", Some("root"), 2, 0), record("root", None, 1, 0)]);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].children[0].id(), "reply");
    }

    #[test]
    fn orphans_are_not_promoted() {
        let forest = build_forest(vec![
            record("root", None, 1, 0),
            record("orphan", Some("gone"), 2, 0),
            record("orphan-child", Some("orphan"), 3, 0),
        ]);
        assert_eq!(all_ids(&forest), ["root"]);
    }

    #[test]
    fn parent_in_other_post_is_an_orphan() {
        let mut foreign = record("foreign", None, 1, 0);
        foreign.post_id = "post-2".into();
        let forest = build_forest(vec![foreign, record("reply", Some("foreign"), 2, 0)]);
        assert_eq!(all_ids(&forest), ["foreign"]);
    }

    #[test]
    fn cycles_are_unreachable() {
        let forest = build_forest(vec![
            record("x", Some("y"), 1, 0),
            record("y", Some("x"), 2, 0),
            record("self", Some("self"), 3, 0),
        ]);
        assert!(forest.is_empty());
    }

    #[test]
    fn duplicate_ids_keep_the_last_record() {
        let mut second = record("a", None, 5, 9);
        second.message = "edited".into();
        let forest = build_forest(vec![record("a", None, 1, 0), second]);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].comment.message, "edited");
        assert_eq!(forest[0].comment.likes, 9);
    }

    #[test]
    fn popular_example_scenario() {
        let records = vec![
            record("1", None, 100, 2),
            record("2", Some("1"), 110, 5),
            record("3", None, 120, 1),
        ];
        let tree = build_sorted_tree(&records, SortMode::Popular, &HashSet::new());
        let roots: Vec<_> = tree.iter().map(|n| n.id()).collect();
        assert_eq!(roots, ["1", "3"]);
        assert_eq!(tree[0].children[0].id(), "2");
    }

    #[test]
    fn liked_flags_reach_descendants() {
        let records = vec![record("1", None, 1, 0), record("2", Some("1"), 2, 0)];
        let liked: HashSet<String> = ["2".to_string()].into();
        let tree = build_sorted_tree(&records, SortMode::Latest, &liked);
        assert!(!tree[0].liked);
        assert!(tree[0].children[0].liked);
    }

    #[test]
    fn toggle_touches_only_one_node() {
        let records = vec![
            record("a", None, 1, 0),
            record("b", Some("a"), 2, 0),
            record("c", Some("b"), 3, 0),
            record("d", None, 4, 0),
        ];
        let tree = build_sorted_tree(&records, SortMode::Oldest, &HashSet::new());
        let tree = toggle_collapse(&tree, "b");
        let collapsed: Vec<_> = walk(&tree)
            .filter(|(n, _)| n.collapsed)
            .map(|(n, _)| n.id())
            .collect();
        assert_eq!(collapsed, ["b"]);

        let folded_parent = toggle_collapse(&tree, "a");
        let unfolded_parent = toggle_collapse(&folded_parent, "a");
        assert_eq!(unfolded_parent, tree);
        assert!(find(&unfolded_parent, "b").unwrap().collapsed);
        assert!(!find(&unfolded_parent, "c").unwrap().collapsed);
    }

    #[test]
    fn collapse_set_survives_rebuild_and_resort() {
        let records = vec![
            record("a", None, 1, 3),
            record("b", Some("a"), 2, 0),
            record("c", None, 3, 0),
        ];
        let tree = build_sorted_tree(&records, SortMode::Latest, &HashSet::new());
        let tree = toggle_collapse(&tree, "a");
        let set = CollapseSet::from_tree(&tree);

        let mut rebuilt = build_sorted_tree(&records, SortMode::Popular, &HashSet::new());
        set.apply(&mut rebuilt);
        assert!(find(&rebuilt, "a").unwrap().collapsed);
        assert!(!find(&rebuilt, "c").unwrap().collapsed);
    }

    #[test]
    fn visible_rows_hide_below_collapsed() {
        let records = vec![
            record("a", None, 1, 0),
            record("b", Some("a"), 2, 0),
            record("c", Some("b"), 3, 0),
            record("d", Some("c"), 4, 0),
        ];
        let tree = build_sorted_tree(&records, SortMode::Oldest, &HashSet::new());
        let rows = visible_rows(&tree, DepthLimit::default());
        let shape: Vec<_> = rows
            .iter()
            .map(|r| (r.node.id(), r.depth, r.can_reply))
            .collect();
        assert_eq!(
            shape,
            [("a", 0, true), ("b", 1, true), ("c", 2, true), ("d", 3, false)]
        );

        let tree = toggle_collapse(&tree, "b");
        let rows: Vec<_> = visible_rows(&tree, DepthLimit::default())
            .iter()
            .map(|r| r.node.id())
            .collect();
        assert_eq!(rows, ["a", "b"]);
    }

    #[test]
    fn depth_and_counts() {
        let tree = build_forest(vec![
            record("a", None, 1, 0),
            record("b", Some("a"), 2, 0),
            record("c", Some("b"), 3, 0),
            record("e", Some("a"), 4, 0),
        ]);
        assert_eq!(depth_of(&tree, "c"), Some(2));
        assert_eq!(depth_of(&tree, "missing"), None);
        let a = find(&tree, "a").unwrap();
        assert_eq!(a.reply_count(), 2);
        assert_eq!(a.descendant_count(), 3);
    }

    #[test]
    fn retain_present_forgets_vanished_ids() {
        let records = vec![record("a", None, 1, 0), record("b", Some("a"), 2, 0)];
        let tree = build_sorted_tree(&records, SortMode::Oldest, &HashSet::new());
        let mut set = CollapseSet::default();
        set.toggle("b");
        set.toggle("gone");
        assert_eq!(set.len(), 2);
        set.retain_present(&tree);
        assert_eq!(set.len(), 1);
        assert!(set.contains("b"));
        assert!(!set.contains("gone"));
    }

    #[test]
    fn deep_reply_chain_is_handled_without_recursion() {
        const LEN: usize = 10_000;
        let records: Vec<_> = (0..LEN)
            .map(|i| {
                let parent = i.checked_sub(1).map(|p| p.to_string());
                record(&i.to_string(), parent.as_deref(), i as i64, (i % 7) as u64)
            })
            .collect();
        let last = (LEN - 1).to_string();
        let liked: HashSet<String> = [last.clone()].into();

        let forest = build_forest(records.iter().cloned());
        assert_eq!(count_nodes(&forest), LEN);

        let tree = build_sorted_tree(&records, SortMode::Popular, &liked);
        assert_eq!(tree.len(), 1);
        assert_eq!(count_nodes(&tree), LEN);
        assert_eq!(depth_of(&tree, &last), Some(LEN - 1));
        assert!(find(&tree, &last).unwrap().liked);
        assert_eq!(tree[0].descendant_count(), LEN - 1);

        let rows = visible_rows(&tree, DepthLimit::default());
        assert_eq!(rows.len(), LEN);
        assert!(rows[2].can_reply);
        assert!(!rows[LEN - 1].can_reply);

        let folded = toggle_collapse(&tree, "5000");
        assert_eq!(visible_rows(&folded, DepthLimit::default()).len(), 5_001);
        let set = CollapseSet::from_tree(&folded);
        assert!(set.contains("5000"));

        let copy = folded.clone();
        assert_eq!(copy, folded);
        assert_ne!(copy, tree);
        drop(copy);
        drop(folded);
        drop(forest);
    }
}
