#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend returned no row for {0}")]
    NotFound(String),
    #[error("backend response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
#[error("could not load {what}")]
pub struct FetchError {
    pub what: String,
    #[source]
    pub source: StoreError,
}

impl FetchError {
    pub fn new(what: impl Into<String>, source: StoreError) -> Self {
        Self {
            what: what.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("message is {len} characters, the limit is {max}")]
    MessageTooLong { len: usize, max: usize },
    #[error("name is {len} characters, the limit is {max}")]
    NameTooLong { len: usize, max: usize },
    #[error("contact is not a valid email address or phone number")]
    InvalidContact,
    #[error("message contains blocked words")]
    Rejected,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("replies are not allowed at depth {depth}")]
    ReplyTooDeep { depth: usize },
    #[error("parent comment {0} is not part of this thread")]
    UnknownParent(String),
    #[error("submission failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum LikeError {
    #[error("already liked from this device")]
    AlreadyLiked,
    #[error("like failed: {0}")]
    Remote(#[source] StoreError),
    #[error("could not record like locally: {0:#}")]
    Local(#[source] anyhow::Error),
}
