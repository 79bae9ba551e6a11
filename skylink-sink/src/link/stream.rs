use jiff::Timestamp;
use skylink_core::protocol::Hex;
use skylink_core::{FrameError, LinkMode, StreamDecoder};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{LinkData, LinkError};

const READ_CHUNK: usize = 256;

/// Read a link byte stream until EOF or cancellation, forwarding every
/// decoded payload and every dropped frame to `tx`.
///
/// Partial frames stay buffered between reads. Framing errors are logged
/// with their raw bytes and never end the loop.
#[instrument(name = "link_reader", skip_all, fields(?mode))]
pub async fn read_link<R>(
    mut reader: R,
    mode: LinkMode,
    tx: mpsc::Sender<LinkData>,
    cancel: CancellationToken,
) -> Result<(), LinkError>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = StreamDecoder::new(mode);
    let mut tmp = [0u8; READ_CHUNK];

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutdown signal received");
                return Ok(());
            }
            read = reader.read(&mut tmp) => read?,
        };

        if n == 0 {
            info!(buffered = decoder.buffered(), "Link stream closed");
            return Ok(());
        }

        decoder.push(&tmp[..n]);

        for data in ready(&mut decoder) {
            if tx.send(data).await.is_err() {
                return Err(LinkError::ChannelClosed);
            }
        }
    }
}

/// Pull every complete item out of `decoder`, stamped with the time it was
/// decoded. Dropped frames are logged here.
pub fn ready(decoder: &mut StreamDecoder) -> impl Iterator<Item = LinkData> + '_ {
    std::iter::from_fn(|| decoder.next_frame()).map(|item| {
        let received_at = Timestamp::now();
        match item {
            Ok(decoded) => {
                debug!(payload = %decoded.payload, address = ?decoded.address, "Received payload");
                LinkData::Payload {
                    payload: decoded.payload,
                    address: decoded.address,
                    received_at,
                }
            }
            Err(error) => {
                log_rejected(&error);
                LinkData::Rejected { error, received_at }
            }
        }
    })
}

fn log_rejected(error: &FrameError) {
    match error {
        FrameError::InvalidEncoding { raw, .. } => {
            warn!(raw = %Hex(raw), "Bad UTF-8 frame");
        }
        FrameError::UnsupportedFrameType(frame_type) => {
            debug!(frame_type, "Skipping non-data API frame");
        }
        e => warn!(error = %e, "Dropping frame"),
    }
}
