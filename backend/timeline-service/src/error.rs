/// Error types for timeline-service
use thiserror::Error;
use uuid::Uuid;

/// Request-level rejections; surfaced unchanged and never retried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Users cannot follow themselves")]
    SelfFollow,

    #[error("Users cannot unfollow themselves")]
    SelfUnfollow,

    #[error("Already following this user")]
    AlreadyFollowing,

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
}

#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Forward and reverse column-store projections disagree
    #[error("Dual write inconsistency: {0}")]
    DualWriteInconsistency(String),

    #[error("Bulk write failed: {0}")]
    BulkWriteFailure(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Column store error: {0}")]
    ColumnStore(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TimelineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, TimelineError::Validation(_))
    }
}

impl From<resilience::TimeoutError> for TimelineError {
    fn from(err: resilience::TimeoutError) -> Self {
        TimelineError::Timeout(err.to_string())
    }
}

/// Result type alias for timeline operations
pub type TimelineResult<T> = Result<T, TimelineError>;
