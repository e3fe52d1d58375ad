use thiserror::Error;

/// Whole-batch failures. Any of these aborts a run and no counts are returned.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no feed URL configured")]
    NoFeedUrl,
    #[error("failed to fetch feed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("feed response exceeds the size limit")]
    ResponseTooLarge,
    #[error("feed returned HTTP status {0}")]
    BadStatus(u16),
    #[error("feed response body is empty")]
    EmptyBody,
    #[error("failed to parse feed XML: {0}")]
    XmlParse(String),
    #[error("feed has no channel element")]
    NoChannel,
    #[error("an import is already running")]
    AlreadyRunning,
    #[error("scheduler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize event store: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("event {0} not found")]
    NotFound(u64),
    #[error("event store rejected the write: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum SideloadError {
    #[error("failed to download image: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("image download returned HTTP status {0}")]
    BadStatus(u16),
    #[error("image exceeds the size limit")]
    TooLarge,
    #[error("image URL is invalid: {0}")]
    InvalidUrl(String),
    #[error("failed to write image: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to attach image: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),
    #[error("could not locate a configuration directory")]
    NoConfigDir,
}
