use std::sync::Arc;

use crate::data::PostService;
use crate::engagement::{self, Tracker};
use crate::error::{FetchError, LikeError, SubmitError};
use crate::model::{NewPost, PostRecord, SortMode};
use crate::sort;
use crate::validate::{ContentFilter, Limits, Validator};

pub struct WallOptions {
    pub sort: SortMode,
    pub page_size: usize,
    pub popular_count: usize,
    pub limits: Limits,
    pub filter: Arc<dyn ContentFilter>,
}

/// The list of posts with "load more" paging and a strip of the most liked
/// posts.
pub struct Wall {
    service: Arc<dyn PostService>,
    options: WallOptions,
    posts: Vec<PostRecord>,
    shown: usize,
}

impl Wall {
    pub fn new(service: Arc<dyn PostService>, options: WallOptions) -> Self {
        let shown = options.page_size;
        Self {
            service,
            options,
            posts: Vec::new(),
            shown,
        }
    }

    pub fn sort(&self) -> SortMode {
        self.options.sort
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Reloads every post. The paging window is kept; a failed load leaves
    /// the previous posts in place.
    pub fn refresh(&mut self) -> Result<(), FetchError> {
        let mut posts = self.service.fetch_posts().map_err(|err| {
            tracing::warn!(error = %err, "post refresh failed");
            FetchError::new("posts", err)
        })?;
        sort::sort_records(&mut posts, self.options.sort);
        self.posts = posts;
        Ok(())
    }

    pub fn set_sort(&mut self, mode: SortMode) {
        self.options.sort = mode;
        sort::sort_records(&mut self.posts, mode);
        self.shown = self.options.page_size;
    }

    pub fn visible(&self) -> &[PostRecord] {
        let end = self.shown.min(self.posts.len());
        &self.posts[..end]
    }

    pub fn has_more(&self) -> bool {
        self.shown < self.posts.len()
    }

    /// Widens the window by one page. Returns how many posts became visible.
    pub fn load_more(&mut self) -> usize {
        let before = self.visible().len();
        self.shown = self.shown.saturating_add(self.options.page_size.max(1));
        self.visible().len() - before
    }

    pub fn popular(&self) -> Vec<PostRecord> {
        sort::top_liked(&self.posts, self.options.popular_count)
    }

    pub fn submit_post(&mut self, draft: &NewPost) -> Result<PostRecord, SubmitError> {
        Validator::new(self.options.limits, self.options.filter.as_ref()).post(draft)?;
        let created = self.service.create_post(draft)?;
        tracing::info!(id = %created.id, "post submitted");
        if let Err(err) = self.refresh() {
            tracing::warn!(error = %err, "reload after post failed");
        }
        Ok(created)
    }

    pub fn like_post(&mut self, id: &str, tracker: &mut Tracker) -> Result<u64, LikeError> {
        let count = engagement::like_post(tracker, self.service.as_ref(), id)?;
        if let Some(post) = self.posts.iter_mut().find(|p| p.id == id) {
            post.likes = count;
        }
        if self.options.sort == SortMode::Popular {
            sort::sort_records(&mut self.posts, SortMode::Popular);
        }
        Ok(count)
    }
}
