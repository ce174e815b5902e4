use std::sync::Arc;

use crate::data::CommentService;
use crate::depth::DepthLimit;
use crate::engagement::{self, Tracker};
use crate::error::{FetchError, LikeError, SubmitError};
use crate::model::{CommentRecord, NewComment, SortMode};
use crate::sort;
use crate::thread::{self, CollapseSet, ThreadNode, VisibleRow};
use crate::validate::{ContentFilter, Limits, Validator};

pub struct BoardOptions {
    pub sort: SortMode,
    pub depth: DepthLimit,
    pub limits: Limits,
    pub filter: Arc<dyn ContentFilter>,
}

/// Thread state for one post: the records last fetched, the sort in effect,
/// and which nodes are folded. The tree is rebuilt from the records after
/// every change.
pub struct CommentBoard {
    post_id: String,
    service: Arc<dyn CommentService>,
    options: BoardOptions,
    records: Vec<CommentRecord>,
    tree: Vec<ThreadNode>,
    collapsed: CollapseSet,
}

impl CommentBoard {
    pub fn new(
        post_id: impl Into<String>,
        service: Arc<dyn CommentService>,
        options: BoardOptions,
    ) -> Self {
        Self {
            post_id: post_id.into(),
            service,
            options,
            records: Vec::new(),
            tree: Vec::new(),
            collapsed: CollapseSet::default(),
        }
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn sort(&self) -> SortMode {
        self.options.sort
    }

    pub fn tree(&self) -> &[ThreadNode] {
        &self.tree
    }

    /// Nodes reachable in the tree. Orphans dropped during the build are not
    /// counted.
    pub fn comment_count(&self) -> usize {
        thread::count_nodes(&self.tree)
    }

    /// Re-fetches the post's comments. On failure the current tree is kept.
    pub fn refresh(&mut self, tracker: &Tracker) -> Result<(), FetchError> {
        let records = self
            .service
            .fetch_comments(&self.post_id)
            .map_err(|err| {
                tracing::warn!(post = %self.post_id, error = %err, "comment refresh failed");
                FetchError::new(format!("comments for post {}", self.post_id), err)
            })?;
        self.records = records;
        self.rebuild(tracker);
        Ok(())
    }

    pub fn set_sort(&mut self, mode: SortMode, tracker: &Tracker) {
        if self.options.sort == mode {
            return;
        }
        self.options.sort = mode;
        self.rebuild(tracker);
    }

    fn rebuild(&mut self, tracker: &Tracker) {
        let mut tree = thread::build_forest(self.records.iter().cloned());
        sort::sort_forest(&mut tree, self.options.sort);
        tracker.annotate(&mut tree);
        self.collapsed.retain_present(&tree);
        self.collapsed.apply(&mut tree);
        tracing::debug!(
            post = %self.post_id,
            records = self.records.len(),
            nodes = thread::count_nodes(&tree),
            sort = %self.options.sort,
            collapsed = self.collapsed.len(),
            "rebuilt thread"
        );
        self.tree = tree;
    }

    /// Validates and stores a comment, then reloads the thread so the new
    /// comment shows up in place. Nothing is inserted locally before the
    /// backend accepts it.
    pub fn submit(
        &mut self,
        draft: &NewComment,
        tracker: &Tracker,
    ) -> Result<CommentRecord, SubmitError> {
        Validator::new(self.options.limits, self.options.filter.as_ref()).comment(draft)?;

        if let Some(parent) = draft.parent_id.as_deref() {
            let depth = thread::depth_of(&self.tree, parent)
                .ok_or_else(|| SubmitError::UnknownParent(parent.to_string()))?;
            if !self.options.depth.can_reply(depth) {
                return Err(SubmitError::ReplyTooDeep { depth });
            }
        }

        let created = self.service.create_comment(&self.post_id, draft)?;
        tracing::info!(post = %self.post_id, id = %created.id, "comment submitted");

        // A failed reload leaves the previous tree; the comment is stored
        // either way and appears on the next successful refresh.
        if let Err(err) = self.refresh(tracker) {
            tracing::warn!(error = %err, "reload after submit failed");
        }
        Ok(created)
    }

    /// Likes a comment and writes the backend's count into the tree.
    pub fn like(&mut self, id: &str, tracker: &mut Tracker) -> Result<u64, LikeError> {
        let count = engagement::like_comment(tracker, self.service.as_ref(), id)?;
        if let Some(record) = self.records.iter_mut().rev().find(|r| r.id == id) {
            record.likes = count;
        }
        self.rebuild(tracker);
        Ok(count)
    }

    /// Returns true when the node is collapsed afterwards.
    pub fn toggle_collapse(&mut self, id: &str) -> bool {
        if thread::find(&self.tree, id).is_none() {
            return false;
        }
        self.tree = thread::toggle_collapse(&self.tree, id);
        self.collapsed.toggle(id)
    }

    pub fn expand_all(&mut self) {
        self.collapsed.clear();
        self.collapsed.apply(&mut self.tree);
    }

    pub fn visible_rows(&self) -> Vec<VisibleRow<'_>> {
        thread::visible_rows(&self.tree, self.options.depth)
    }

    /// The most liked comments of the thread, regardless of nesting.
    pub fn top_comments(&self, count: usize) -> Vec<CommentRecord> {
        let reachable: Vec<CommentRecord> = thread::walk(&self.tree)
            .map(|(node, _)| node.comment.clone())
            .collect();
        sort::top_liked(&reachable, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryWall;
    use crate::error::StoreError;
    use crate::names::FixedName;
    use crate::validate::WordListFilter;
    use chrono::{Duration, Utc};
    use parking_lot::Mutex;

    fn options() -> BoardOptions {
        BoardOptions {
            sort: SortMode::Oldest,
            depth: DepthLimit::default(),
            limits: Limits::default(),
            filter: Arc::new(WordListFilter::new(["spam"])),
        }
    }

    fn record(id: &str, parent: Option<&str>, minutes: i64) -> CommentRecord {
        CommentRecord {
            id: id.into(),
            post_id: "p".into(),
            parent_id: parent.map(str::to_string),
            author: "anon".into(),
            message: id.into(),
            created_at: Utc::now() - Duration::minutes(minutes),
            updated_at: None,
            likes: 0,
        }
    }

    fn board() -> (Arc<MemoryWall>, CommentBoard) {
        let wall = Arc::new(MemoryWall::with_records(
            Arc::new(FixedName("Quiet Owl".into())),
            Vec::new(),
            vec![
                record("a", None, 40),
                record("b", Some("a"), 30),
                record("c", Some("b"), 20),
                record("d", Some("c"), 10),
            ],
        ));
        let board = CommentBoard::new("p", wall.clone(), options());
        (wall, board)
    }

    #[test]
    fn failed_refresh_keeps_the_tree() {
        let (wall, mut board) = board();
        let tracker = Tracker::ephemeral();
        board.refresh(&tracker).unwrap();
        assert_eq!(board.comment_count(), 4);

        wall.set_failing(true);
        assert!(board.refresh(&tracker).is_err());
        assert_eq!(board.comment_count(), 4);
    }

    #[test]
    fn invalid_drafts_make_no_call() {
        let (wall, mut board) = board();
        let tracker = Tracker::ephemeral();
        board.refresh(&tracker).unwrap();
        let calls = wall.calls();

        let draft = NewComment {
            message: "buy SPAM now".into(),
            ..Default::default()
        };
        let err = board.submit(&draft, &tracker).unwrap_err();
        assert!(matches!(err, SubmitError::Invalid(_)));
        assert_eq!(wall.calls(), calls);
        assert_eq!(draft.message, "buy SPAM now");
    }

    #[test]
    fn replies_stop_at_max_depth() {
        let (wall, mut board) = board();
        let tracker = Tracker::ephemeral();
        board.refresh(&tracker).unwrap();
        let calls = wall.calls();

        let too_deep = NewComment {
            message: "deeper".into(),
            parent_id: Some("d".into()),
            ..Default::default()
        };
        assert!(matches!(
            board.submit(&too_deep, &tracker),
            Err(SubmitError::ReplyTooDeep { depth: 3 })
        ));
        let unknown = NewComment {
            message: "where".into(),
            parent_id: Some("nope".into()),
            ..Default::default()
        };
        assert!(matches!(
            board.submit(&unknown, &tracker),
            Err(SubmitError::UnknownParent(_))
        ));
        assert_eq!(wall.calls(), calls);

        let ok = NewComment {
            message: "fine".into(),
            parent_id: Some("c".into()),
            ..Default::default()
        };
        let created = board.submit(&ok, &tracker).unwrap();
        assert_eq!(thread::depth_of(board.tree(), &created.id), Some(3));
    }

    #[test]
    fn collapse_survives_refresh_and_sort() {
        let (_wall, mut board) = board();
        let mut tracker = Tracker::ephemeral();
        board.refresh(&tracker).unwrap();
        assert!(board.toggle_collapse("b"));
        assert_eq!(board.visible_rows().len(), 2);

        board.like("a", &mut tracker).unwrap();
        board.set_sort(SortMode::Popular, &tracker);
        board.refresh(&tracker).unwrap();
        assert!(thread::find(board.tree(), "b").unwrap().collapsed);
        assert_eq!(board.visible_rows().len(), 2);

        board.expand_all();
        assert_eq!(board.visible_rows().len(), 4);
        assert!(!board.toggle_collapse("missing"));
    }

    /// Serves whatever the test currently holds in `records`.
    struct Shared {
        records: Mutex<Vec<CommentRecord>>,
    }

    impl CommentService for Shared {
        fn fetch_comments(&self, _post_id: &str) -> Result<Vec<CommentRecord>, StoreError> {
            Ok(self.records.lock().clone())
        }

        fn create_comment(
            &self,
            _post_id: &str,
            _draft: &NewComment,
        ) -> Result<CommentRecord, StoreError> {
            Err(StoreError::Status {
                status: 403,
                body: "read only".into(),
            })
        }

        fn increment_comment_like(&self, _id: &str) -> Result<u64, StoreError> {
            Err(StoreError::Status {
                status: 403,
                body: "read only".into(),
            })
        }
    }

    #[test]
    fn deleted_comments_leave_the_collapse_set() {
        let shared = Arc::new(Shared {
            records: Mutex::new(vec![
                record("a", None, 30),
                record("b", Some("a"), 20),
                record("c", None, 10),
            ]),
        });
        let tracker = Tracker::ephemeral();
        let mut board = CommentBoard::new("p", shared.clone(), options());
        board.refresh(&tracker).unwrap();
        assert!(board.toggle_collapse("a"));
        assert!(board.toggle_collapse("c"));

        shared.records.lock().retain(|r| r.id != "c");
        board.refresh(&tracker).unwrap();
        assert!(board.collapsed.contains("a"));
        assert!(!board.collapsed.contains("c"));
        assert_eq!(board.collapsed.len(), 1);

        // A comment that comes back later under the same id starts unfolded.
        shared.records.lock().push(record("c", None, 10));
        board.refresh(&tracker).unwrap();
        assert!(!thread::find(board.tree(), "c").unwrap().collapsed);
    }

    #[test]
    fn like_uses_the_backend_count() {
        let (_wall, mut board) = board();
        let mut tracker = Tracker::ephemeral();
        board.refresh(&tracker).unwrap();
        assert_eq!(board.like("c", &mut tracker).unwrap(), 1);
        let node = thread::find(board.tree(), "c").unwrap();
        assert_eq!(node.comment.likes, 1);
        assert!(node.liked);
        assert_eq!(board.top_comments(1)[0].id, "c");
    }
}
