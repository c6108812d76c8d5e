#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("request rejected: unauthorized")]
    Unauthorized,

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store encoding error for key '{key}': {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("network error: {0}")]
    Network(#[source] RemoteError),

    #[error("another login is already in progress")]
    OperationInProgress,

    #[error("a session is already established")]
    AlreadyAuthenticated,

    /// Local state was cleared, the backend never confirmed the push-token invalidation.
    #[error("logout completed locally only: {0}")]
    LogoutFailed(#[source] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mute preference saved locally but not synced: {0}")]
pub struct RemoteSyncFailed(#[source] pub RemoteError);

#[derive(Debug, thiserror::Error)]
pub enum MuteError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("network error: {0}")]
    Network(#[source] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid page request (page {page}, size {page_size})")]
    InvalidPage { page: u32, page_size: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Notification(#[from] NotificationError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not logged in")]
    NotAuthenticated,

    #[error("no sensor named '{0}' is assigned to this account")]
    UnknownSensor(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error(transparent)]
    Mute(#[from] MuteError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to set up backend client: {0}")]
    Backend(#[source] RemoteError),
}
