use thiserror::Error;
use uuid::Uuid;

/// Template or content rendering failure. Terminal for the notification: it
/// is marked failed without a send attempt and is not retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("missing variable in template: {0}")]
    MissingVariable(String),

    #[error("unsupported context value for key '{0}'")]
    UnsupportedValue(String),
}

impl RenderError {
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::MissingVariable(_) => "MissingVariable",
            RenderError::UnsupportedValue(_) => "UnsupportedValue",
        }
    }
}

/// Push backend call failure. Terminal for the notification within the
/// attempt and isolated from its siblings in the same shard.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("push backend authentication failed: {0}")]
    Auth(String),

    #[error("push backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push backend rejected the message ({status}): {detail}")]
    Backend { status: u16, detail: String },
}

impl SendError {
    pub fn kind(&self) -> &'static str {
        match self {
            SendError::Auth(_) => "AuthError",
            SendError::Http(_) => "HttpError",
            SendError::Backend { .. } => "BackendError",
        }
    }
}

/// Store query or update failure. Fatal for the current drain iteration and
/// propagated to the caller rather than swallowed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("notification not found: {0}")]
    NotFound(Uuid),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("dispatch task failed: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum DrainError {
    #[error("lockfile error: {0}")]
    Lock(#[from] std::io::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Produce API failure, raised synchronously at call time. A configuration
/// error is never queued.
#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("invalid notification arguments: {0}")]
    Configuration(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
