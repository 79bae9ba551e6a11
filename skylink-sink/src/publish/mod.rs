pub mod log;
pub mod memory;
pub mod thingspeak;

use async_trait::async_trait;
use skylink_core::CombinedSnapshot;

/// Sends a combined snapshot to its destination.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    async fn publish(&self, snapshot: &CombinedSnapshot) -> Result<PublishReceipt, PublishError>;
}

/// What the destination reported back for an accepted publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReceipt {
    /// Channel entry id assigned by the destination, when it has one.
    pub entry_id: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Publish rejected with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Accepted by HTTP but not stored, e.g. rate limited.
    #[error("Update was not stored by the channel")]
    Rejected,

    #[error("No API key configured")]
    MissingApiKey,
}
