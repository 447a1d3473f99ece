use thiserror::Error;

use crate::{github::GitHubClientError, wordpress::WordpressClientError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("GitHub error: {0}")]
    GitHub(#[from] GitHubClientError),
    #[error("Wordpress error: {0}")]
    Wordpress(#[from] WordpressClientError),
    #[error("App user has no write permissions for {0}")]
    NoPushPermission(String),
    #[error("Tree entry {path} is {size} bytes, more than the {ceiling} bytes allowed by request")]
    EntryTooLarge {
        path: String,
        size: usize,
        ceiling: usize,
    },
    #[error("Unexpected Wordpress data: {0}")]
    UpstreamData(String),
    #[error("Binary file {0} is still pending, it must be resolved or removed before publish")]
    PendingBinary(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Remote configuration error: {0}")]
    RemoteConfig(String),
    #[error("Programmatic error : {0}")]
    Programmatic(String),
}
