use std::cmp::{Ordering, Reverse};

use chrono::{DateTime, Utc};

use crate::model::{CommentRecord, PostRecord, SortMode};
use crate::thread::ThreadNode;

/// Anything that can be placed on the wall or in a thread and ordered by a
/// [`SortMode`].
pub trait Rankable {
    fn rank_id(&self) -> &str;
    fn rank_created_at(&self) -> DateTime<Utc>;
    fn rank_likes(&self) -> u64;
}

impl Rankable for CommentRecord {
    fn rank_id(&self) -> &str {
        &self.id
    }

    fn rank_created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn rank_likes(&self) -> u64 {
        self.likes
    }
}

impl Rankable for PostRecord {
    fn rank_id(&self) -> &str {
        &self.id
    }

    fn rank_created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn rank_likes(&self) -> u64 {
        self.likes
    }
}

impl Rankable for ThreadNode {
    fn rank_id(&self) -> &str {
        &self.comment.id
    }

    fn rank_created_at(&self) -> DateTime<Utc> {
        self.comment.created_at
    }

    fn rank_likes(&self) -> u64 {
        self.comment.likes
    }
}

/// Total order for `mode`. The id is always the final tie-breaker so the
/// result never depends on the order items arrived in.
pub fn compare<T: Rankable>(mode: SortMode, a: &T, b: &T) -> Ordering {
    let primary = match mode {
        SortMode::Latest => Reverse(a.rank_created_at()).cmp(&Reverse(b.rank_created_at())),
        SortMode::Oldest => a.rank_created_at().cmp(&b.rank_created_at()),
        SortMode::Popular => Reverse(a.rank_likes())
            .cmp(&Reverse(b.rank_likes()))
            .then_with(|| Reverse(a.rank_created_at()).cmp(&Reverse(b.rank_created_at()))),
    };
    primary.then_with(|| a.rank_id().cmp(b.rank_id()))
}

pub fn sort_records<T: Rankable>(items: &mut [T], mode: SortMode) {
    items.sort_by(|a, b| compare(mode, a, b));
}

/// Orders every sibling group of the forest. Only positions change; node
/// annotations travel with their nodes.
pub fn sort_forest(nodes: &mut [ThreadNode], mode: SortMode) {
    let mut pending = vec![nodes];
    while let Some(level) = pending.pop() {
        sort_records(level, mode);
        for node in level {
            if !node.children.is_empty() {
                pending.push(node.children.as_mut_slice());
            }
        }
    }
}

/// The `count` most liked items, newest first among equals.
pub fn top_liked<T: Rankable + Clone>(items: &[T], count: usize) -> Vec<T> {
    let mut ranked = items.to_vec();
    sort_records(&mut ranked, SortMode::Popular);
    ranked.truncate(count);
    ranked
}
