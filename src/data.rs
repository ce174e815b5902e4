use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use rand::RngCore;

use crate::backend;
use crate::error::StoreError;
use crate::model::{CommentRecord, NewComment, NewPost, PostRecord};
use crate::names::{self, NameGenerator};

pub trait PostService: Send + Sync {
    fn fetch_posts(&self) -> Result<Vec<PostRecord>, StoreError>;
    fn get_post(&self, id: &str) -> Result<Option<PostRecord>, StoreError>;
    fn create_post(&self, post: &NewPost) -> Result<PostRecord, StoreError>;
    /// Returns the like count stored by the backend after the increment.
    fn increment_post_like(&self, id: &str) -> Result<u64, StoreError>;
}

pub trait CommentService: Send + Sync {
    /// Comments of one post, in no particular order.
    fn fetch_comments(&self, post_id: &str) -> Result<Vec<CommentRecord>, StoreError>;
    fn create_comment(&self, post_id: &str, comment: &NewComment)
        -> Result<CommentRecord, StoreError>;
    /// Returns the like count stored by the backend after the increment.
    fn increment_comment_like(&self, id: &str) -> Result<u64, StoreError>;
}

pub struct RestPostService {
    client: Arc<backend::Client>,
}

impl RestPostService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl PostService for RestPostService {
    fn fetch_posts(&self) -> Result<Vec<PostRecord>, StoreError> {
        self.client.posts()
    }

    fn get_post(&self, id: &str) -> Result<Option<PostRecord>, StoreError> {
        self.client.post(id)
    }

    fn create_post(&self, post: &NewPost) -> Result<PostRecord, StoreError> {
        self.client.insert_post(post)
    }

    fn increment_post_like(&self, id: &str) -> Result<u64, StoreError> {
        self.client.increment_post_likes(id)
    }
}

pub struct RestCommentService {
    client: Arc<backend::Client>,
}

impl RestCommentService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for RestCommentService {
    fn fetch_comments(&self, post_id: &str) -> Result<Vec<CommentRecord>, StoreError> {
        self.client.comments(post_id)
    }

    fn create_comment(
        &self,
        post_id: &str,
        comment: &NewComment,
    ) -> Result<CommentRecord, StoreError> {
        self.client.insert_comment(post_id, comment)
    }

    fn increment_comment_like(&self, id: &str) -> Result<u64, StoreError> {
        self.client.increment_comment_likes(id)
    }
}

#[derive(Default)]
struct MemoryState {
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
    failing: bool,
    calls: usize,
}

/// In-process stand-in for the hosted backend. Serves both the post and the
/// comment contract so the wall can run offline.
pub struct MemoryWall {
    state: Mutex<MemoryState>,
    names: Arc<dyn NameGenerator>,
}

impl MemoryWall {
    pub fn new(names: Arc<dyn NameGenerator>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            names,
        }
    }

    pub fn with_records(
        names: Arc<dyn NameGenerator>,
        posts: Vec<PostRecord>,
        comments: Vec<CommentRecord>,
    ) -> Self {
        let wall = Self::new(names);
        {
            let mut state = wall.state.lock();
            state.posts = posts;
            state.comments = comments;
        }
        wall
    }

    /// Makes every following call fail, as if the backend went away.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Number of backend calls served so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    fn enter(&self) -> Result<parking_lot::MutexGuard<'_, MemoryState>, StoreError> {
        let mut state = self.state.lock();
        state.calls += 1;
        if state.failing {
            return Err(StoreError::Status {
                status: 503,
                body: "backend unavailable".into(),
            });
        }
        Ok(state)
    }
}

fn new_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl PostService for MemoryWall {
    fn fetch_posts(&self) -> Result<Vec<PostRecord>, StoreError> {
        Ok(self.enter()?.posts.clone())
    }

    fn get_post(&self, id: &str) -> Result<Option<PostRecord>, StoreError> {
        Ok(self.enter()?.posts.iter().find(|p| p.id == id).cloned())
    }

    fn create_post(&self, post: &NewPost) -> Result<PostRecord, StoreError> {
        let mut state = self.enter()?;
        let record = PostRecord {
            id: new_id(),
            name: names::or_generated(post.name.as_deref(), self.names.as_ref()),
            affiliation: post.affiliation.clone(),
            contact: post.contact.clone(),
            message: post.message.clone(),
            created_at: Utc::now(),
            likes: 0,
            card_style: post.card_style,
            card_color: post.card_color.clone(),
        };
        state.posts.push(record.clone());
        Ok(record)
    }

    fn increment_post_like(&self, id: &str) -> Result<u64, StoreError> {
        let mut state = self.enter()?;
        let post = state
            .posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("post {id}")))?;
        post.likes += 1;
        Ok(post.likes)
    }
}

impl CommentService for MemoryWall {
    fn fetch_comments(&self, post_id: &str) -> Result<Vec<CommentRecord>, StoreError> {
        Ok(self
            .enter()?
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect())
    }

    fn create_comment(
        &self,
        post_id: &str,
        comment: &NewComment,
    ) -> Result<CommentRecord, StoreError> {
        let mut state = self.enter()?;
        // Keep creation times strictly increasing so back-to-back submissions
        // still sort deterministically.
        let latest = state.comments.iter().map(|c| c.created_at).max();
        let created_at = match latest {
            Some(latest) if latest >= Utc::now() => latest + Duration::milliseconds(1),
            _ => Utc::now(),
        };
        let record = CommentRecord {
            id: new_id(),
            post_id: post_id.to_string(),
            parent_id: comment.parent_id.clone(),
            author: names::or_generated(comment.author.as_deref(), self.names.as_ref()),
            message: comment.message.clone(),
            created_at,
            updated_at: None,
            likes: 0,
        };
        state.comments.push(record.clone());
        Ok(record)
    }

    fn increment_comment_like(&self, id: &str) -> Result<u64, StoreError> {
        let mut state = self.enter()?;
        let comment = state
            .comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("comment {id}")))?;
        comment.likes += 1;
        Ok(comment.likes)
    }
}

/// A handful of posts and a small reply tree for offline browsing.
pub fn demo_wall(names: Arc<dyn NameGenerator>) -> MemoryWall {
    let now = Utc::now();
    let post = |id: &str, name: &str, message: &str, hours: i64, likes: u64| PostRecord {
        id: id.into(),
        name: name.into(),
        affiliation: None,
        contact: None,
        message: message.into(),
        created_at: now - Duration::hours(hours),
        likes,
        card_style: Default::default(),
        card_color: None,
    };
    let comment = |id: &str, parent: Option<&str>, author: &str, message: &str, minutes: i64| {
        CommentRecord {
            id: id.into(),
            post_id: "welcome".into(),
            parent_id: parent.map(str::to_string),
            author: author.into(),
            message: message.into(),
            created_at: now - Duration::minutes(minutes),
            updated_at: None,
            likes: 0,
        }
    };

    MemoryWall::with_records(
        names,
        vec![
            post("welcome", "Wishwall", "Welcome to the wall! Leave a kind word.", 48, 12),
            post("thanks", "Mina", "Thank you to everyone who helped this year.", 20, 30),
            post("cheer", "Sunny Fox", "Good luck on your exams, you've got this!", 2, 4),
        ],
        vec![
            comment("c1", None, "Jun", "What a lovely idea.", 300),
            comment("c2", Some("c1"), "Mina", "Agreed, thanks for setting it up.", 240),
            comment("c3", Some("c2"), "Jun", "Happy to help!", 200),
            comment("c4", Some("c3"), "Quiet Owl", "This thread is getting deep.", 100),
            comment("c5", None, "Lucky Panda", "First time here, hello!", 30),
        ],
    )
}
