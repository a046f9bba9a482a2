use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("board not found: {0}")]
    BoardNotFound(String),

    #[error("board '{board}' has no list named '{list}'")]
    ListNotFound { board: String, list: String },

    #[error("{service} API returned {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("malformed milestone URL: {0}")]
    MalformedMilestoneUrl(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl SyncError {
    /// Whether a retry can plausibly succeed. Transport failures and
    /// server-side errors (5xx, 429) qualify; client errors and anything
    /// structural never do.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Http(e) => {
                // A transport-level failure (connect, timeout, body) is
                // transient; a status captured via error_for_status follows
                // the same 5xx/429 rule as Api.
                match e.status() {
                    Some(status) => status.is_server_error() || status.as_u16() == 429,
                    None => !e.is_builder() && !e.is_decode(),
                }
            }
            SyncError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
