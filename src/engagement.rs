use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::data::{CommentService, PostService};
use crate::error::{LikeError, StoreError};
use crate::storage::{LikeKind, Store};
use crate::thread::{self, ThreadNode};

/// What this device has liked. The sets are loaded once and then kept in step
/// with the local store on every change.
pub struct Tracker {
    store: Option<Arc<Store>>,
    posts: HashSet<String>,
    comments: HashSet<String>,
}

impl Tracker {
    pub fn load(store: Arc<Store>) -> Result<Self> {
        let collect = |kind: LikeKind| -> Result<HashSet<String>> {
            Ok(store
                .list_likes(kind)
                .with_context(|| format!("engagement: load liked {}s", kind.as_str()))?
                .into_iter()
                .collect())
        };
        let posts = collect(LikeKind::Post)?;
        let comments = collect(LikeKind::Comment)?;
        tracing::debug!(
            posts = posts.len(),
            comments = comments.len(),
            "engagement: loaded liked ids"
        );
        Ok(Self {
            store: Some(store),
            posts,
            comments,
        })
    }

    /// A tracker that forgets everything when dropped.
    pub fn ephemeral() -> Self {
        Self {
            store: None,
            posts: HashSet::new(),
            comments: HashSet::new(),
        }
    }

    fn set(&self, kind: LikeKind) -> &HashSet<String> {
        match kind {
            LikeKind::Post => &self.posts,
            LikeKind::Comment => &self.comments,
        }
    }

    fn set_mut(&mut self, kind: LikeKind) -> &mut HashSet<String> {
        match kind {
            LikeKind::Post => &mut self.posts,
            LikeKind::Comment => &mut self.comments,
        }
    }

    pub fn has_liked(&self, kind: LikeKind, id: &str) -> bool {
        self.set(kind).contains(id)
    }

    /// Returns false when the id was already recorded.
    pub fn record_like(&mut self, kind: LikeKind, id: &str) -> Result<bool> {
        if self.has_liked(kind, id) {
            return Ok(false);
        }
        if let Some(store) = &self.store {
            store.insert_like(kind, id)?;
        }
        Ok(self.set_mut(kind).insert(id.to_string()))
    }

    /// Drops the id from memory first, so a failing store still leaves the
    /// item likeable in this session.
    pub fn forget(&mut self, kind: LikeKind, id: &str) -> Result<()> {
        self.set_mut(kind).remove(id);
        if let Some(store) = &self.store {
            store.delete_like(kind, id)?;
        }
        Ok(())
    }

    pub fn liked_comments(&self) -> &HashSet<String> {
        &self.comments
    }

    pub fn liked_posts(&self) -> &HashSet<String> {
        &self.posts
    }

    pub fn annotate(&self, nodes: &mut [ThreadNode]) {
        thread::mark_liked(nodes, &self.comments);
    }
}

/// Likes a comment at most once per device and returns the count the backend
/// stored.
pub fn like_comment(
    tracker: &mut Tracker,
    service: &dyn CommentService,
    id: &str,
) -> Result<u64, LikeError> {
    like(tracker, LikeKind::Comment, id, || {
        service.increment_comment_like(id)
    })
}

pub fn like_post(
    tracker: &mut Tracker,
    service: &dyn PostService,
    id: &str,
) -> Result<u64, LikeError> {
    like(tracker, LikeKind::Post, id, || service.increment_post_like(id))
}

fn like<F>(tracker: &mut Tracker, kind: LikeKind, id: &str, increment: F) -> Result<u64, LikeError>
where
    F: FnOnce() -> Result<u64, StoreError>,
{
    if tracker.has_liked(kind, id) {
        return Err(LikeError::AlreadyLiked);
    }
    tracker.record_like(kind, id).map_err(LikeError::Local)?;

    match increment() {
        Ok(count) => {
            tracing::info!(kind = kind.as_str(), id, count, "liked");
            Ok(count)
        }
        Err(err) => {
            tracing::warn!(kind = kind.as_str(), id, error = %err, "like failed, rolling back");
            if let Err(rollback) = tracker.forget(kind, id) {
                tracing::warn!(kind = kind.as_str(), id, error = %rollback, "like rollback failed");
            }
            Err(LikeError::Remote(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryWall;
    use crate::model::NewComment;
    use crate::names::FixedName;

    fn wall_with_comment() -> (MemoryWall, String) {
        let wall = MemoryWall::new(Arc::new(FixedName("Quiet Owl".into())));
        let comment = wall
            .create_comment(
                "p",
                &NewComment {
                    message: "hi".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        (wall, comment.id)
    }

    #[test]
    fn second_like_never_reaches_the_backend() {
        let (wall, id) = wall_with_comment();
        let mut tracker = Tracker::ephemeral();
        assert_eq!(like_comment(&mut tracker, &wall, &id).unwrap(), 1);
        let calls = wall.calls();

        let err = like_comment(&mut tracker, &wall, &id).unwrap_err();
        assert!(matches!(err, LikeError::AlreadyLiked));
        assert_eq!(wall.calls(), calls);
    }

    #[test]
    fn failed_like_is_rolled_back() {
        let (wall, id) = wall_with_comment();
        let mut tracker = Tracker::ephemeral();
        wall.set_failing(true);
        let err = like_comment(&mut tracker, &wall, &id).unwrap_err();
        assert!(matches!(err, LikeError::Remote(_)));
        assert!(!tracker.has_liked(LikeKind::Comment, &id));

        wall.set_failing(false);
        assert_eq!(like_comment(&mut tracker, &wall, &id).unwrap(), 1);
    }

    #[test]
    fn likes_persist_through_the_store() {
        let store = Arc::new(Store::in_memory().unwrap());
        let mut tracker = Tracker::load(store.clone()).unwrap();
        assert!(tracker.record_like(LikeKind::Post, "p1").unwrap());
        assert!(!tracker.record_like(LikeKind::Post, "p1").unwrap());

        let reloaded = Tracker::load(store.clone()).unwrap();
        assert!(reloaded.has_liked(LikeKind::Post, "p1"));
        assert!(!reloaded.has_liked(LikeKind::Comment, "p1"));

        tracker.forget(LikeKind::Post, "p1").unwrap();
        assert!(!Tracker::load(store).unwrap().has_liked(LikeKind::Post, "p1"));
    }

    #[test]
    fn forget_clears_memory_even_when_the_store_fails() {
        let store = Arc::new(Store::in_memory().unwrap());
        let mut tracker = Tracker::load(store.clone()).unwrap();
        tracker.record_like(LikeKind::Comment, "c1").unwrap();
        store.drop_likes_table();

        assert!(tracker.forget(LikeKind::Comment, "c1").is_err());
        assert!(!tracker.has_liked(LikeKind::Comment, "c1"));
    }

    #[test]
    fn annotate_marks_liked_nodes() {
        let (wall, id) = wall_with_comment();
        let mut tracker = Tracker::ephemeral();
        like_comment(&mut tracker, &wall, &id).unwrap();
        let mut tree = thread::build_forest(wall.fetch_comments("p").unwrap());
        tracker.annotate(&mut tree);
        assert!(tree[0].liked);
    }
}
