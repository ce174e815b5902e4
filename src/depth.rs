/// Deepest level that still offers a reply action. Roots are depth 0, so with
/// 3 a thread can hold a root and three levels of replies.
pub const DEFAULT_MAX_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthLimit {
    pub max_depth: usize,
}

impl DepthLimit {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Nodes at or past the limit are still shown, they just can't be
    /// replied to.
    pub fn can_reply(&self, depth: usize) -> bool {
        depth < self.max_depth
    }
}

impl Default for DepthLimit {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

pub fn can_reply(depth: usize) -> bool {
    DepthLimit::default().can_reply(depth)
}
