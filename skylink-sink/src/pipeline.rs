use std::sync::Arc;

use jiff::{SignedDuration, Timestamp};
use skylink_core::{CombinedSnapshot, NodeTags, ParseError, SensorRecord};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::link::LinkData;
use crate::publish::Publisher;
use crate::state::{DropReason, RelayState};

/// Consume link data until the link closes or shutdown is requested.
///
/// Every payload is parsed and folded into the relay state. When the publish
/// gate fires, the snapshot is published on its own task so a slow upload
/// never holds up intake. Publishes still in flight are awaited before
/// returning.
#[instrument(name = "processor", skip_all)]
pub async fn run_processor<P: Publisher>(
    mut link_rx: mpsc::Receiver<LinkData>,
    state: RelayState,
    publisher: Arc<P>,
    tags: NodeTags,
    interval: SignedDuration,
    cancel: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "Processor started");

    let mut publishes = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Processor shutting down");
                break;
            }
            data = link_rx.recv() => {
                let Some(data) = data else {
                    info!("Link closed");
                    break;
                };
                if let Some(snapshot) = process(data, &state, &tags, interval).await {
                    publishes.spawn(
                        publish(Arc::clone(&publisher), state.clone(), snapshot)
                            .instrument(info_span!("publish")),
                    );
                }
            }
            Some(result) = publishes.join_next(), if !publishes.is_empty() => {
                if let Err(e) = result {
                    error!(error = %e, "Publish task failed");
                }
            }
        }
    }

    while let Some(result) = publishes.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Publish task failed");
        }
    }
}

/// Fold one item from the link into the state. Returns the snapshot to
/// publish when the gate fires.
async fn process(
    data: LinkData,
    state: &RelayState,
    tags: &NodeTags,
    interval: SignedDuration,
) -> Option<CombinedSnapshot> {
    match data {
        LinkData::Rejected { .. } => {
            // Already logged by the reader.
            state.record_dropped(DropReason::Framing).await;
            None
        }
        LinkData::Payload {
            payload,
            address,
            received_at,
        } => {
            state.frame_received().await;
            match SensorRecord::parse(&payload, tags) {
                Ok(record) => {
                    debug!(?record, ?address, "Applying record");
                    state.ingest(&record, received_at, interval).await
                }
                Err(e) => {
                    let reason = match e {
                        ParseError::MalformedPayload { .. } => DropReason::Malformed,
                        ParseError::UnknownTag { .. } => DropReason::UnknownTag,
                    };
                    warn!(error = %e, ?address, "Dropping payload");
                    state.record_dropped(reason).await;
                    None
                }
            }
        }
    }
}

async fn publish<P: Publisher>(publisher: Arc<P>, state: RelayState, snapshot: CombinedSnapshot) {
    match publisher.publish(&snapshot).await {
        Ok(receipt) => {
            info!(entry_id = ?receipt.entry_id, "Snapshot published");
            state.record_publish(true, Timestamp::now()).await;
        }
        Err(e) => {
            warn!(error = %e, "Publish failed");
            state.record_publish(false, Timestamp::now()).await;
        }
    }
}
