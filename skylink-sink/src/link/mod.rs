pub mod mock;
pub mod serial;
pub mod stream;
pub mod tcp;

use async_trait::async_trait;
use jiff::Timestamp;
use skylink_core::{Address64, FrameError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Data received from the radio link.
#[derive(Debug, Clone)]
pub enum LinkData {
    /// A payload that passed framing and UTF-8 validation.
    Payload {
        payload: String,
        address: Option<Address64>,
        received_at: Timestamp,
    },
    /// A frame or line that was dropped by the decoder.
    Rejected {
        error: FrameError,
        received_at: Timestamp,
    },
}

/// Trait for receiving data from the radio link.
///
/// Implementations spawn background tasks that read the transport, decode
/// it, and send the results to an mpsc channel. The receiver is returned from
/// the `start` method.
#[async_trait]
pub trait LinkReceiver: Send + Sync + 'static {
    /// Error type for this link implementation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open the transport and start receiving.
    ///
    /// Failing to open the transport is reported here. The background tasks
    /// run until the cancellation token is cancelled.
    async fn start(&self, cancel: CancellationToken)
    -> Result<mpsc::Receiver<LinkData>, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal link channel closed")]
    ChannelClosed,
}
