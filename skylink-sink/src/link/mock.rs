use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use skylink_core::protocol::encode;
use skylink_core::{Address64, ImuReading, LinkMode, NodeTags, SensorRecord};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use super::{LinkData, LinkReceiver, stream::read_link};

const PIPE_CAPACITY: usize = 4096;
const STANDARD_GRAVITY: f64 = 9.80665;

/// Mock link that simulates the IMU node and the distance node.
///
/// Both nodes encode their payloads into API frames and write them into an
/// in-memory pipe, which is decoded exactly like a real serial link.
pub struct MockLinkReceiver {
    /// Interval between IMU node frames.
    imu_interval: Duration,
    /// Interval between distance node frames.
    distance_interval: Duration,
    tags: NodeTags,
}

impl MockLinkReceiver {
    pub fn new(imu_interval_ms: u64, distance_interval_ms: u64, tags: NodeTags) -> Self {
        Self {
            imu_interval: Duration::from_millis(imu_interval_ms),
            distance_interval: Duration::from_millis(distance_interval_ms),
            tags,
        }
    }
}

#[async_trait]
impl LinkReceiver for MockLinkReceiver {
    type Error = std::convert::Infallible;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<LinkData>, Self::Error> {
        let (tx, rx) = mpsc::channel(100);
        let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);

        info!(
            imu_interval_ms = self.imu_interval.as_millis() as u64,
            distance_interval_ms = self.distance_interval.as_millis() as u64,
            "Mock link started"
        );

        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = read_link(reader, LinkMode::Api, tx, reader_cancel).await {
                error!(error = %e, "Mock link reader stopped");
            }
        });

        tokio::spawn(run_nodes(
            writer,
            self.imu_interval,
            self.distance_interval,
            self.tags.clone(),
            cancel,
        ));

        Ok(rx)
    }
}

#[instrument(name = "mock_nodes", skip_all)]
async fn run_nodes(
    mut writer: DuplexStream,
    imu_interval: Duration,
    distance_interval: Duration,
    tags: NodeTags,
    cancel: CancellationToken,
) {
    let mut imu_tick = tokio::time::interval(imu_interval);
    let mut distance_tick = tokio::time::interval(distance_interval);

    loop {
        let record = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Mock nodes shutting down");
                break;
            }
            _ = imu_tick.tick() => simulate_imu(),
            _ = distance_tick.tick() => simulate_distance(),
        };

        let payload = record.to_payload(&tags);
        let frame = match encode(payload.as_bytes(), Address64::COORDINATOR) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to encode mock frame");
                continue;
            }
        };

        if let Err(e) = writer.write_all(&frame).await {
            error!(error = %e, "Mock link pipe closed");
            break;
        }
    }
}

/// A node lying roughly flat and still, with sensor noise.
fn simulate_imu() -> SensorRecord {
    let mut rng = rand::rng();
    SensorRecord::Imu(ImuReading {
        ax: rng.random_range(-0.3..0.3),
        ay: rng.random_range(-0.3..0.3),
        az: STANDARD_GRAVITY + rng.random_range(-0.2..0.2),
        gx: rng.random_range(-2.0..2.0),
        gy: rng.random_range(-2.0..2.0),
        gz: rng.random_range(-2.0..2.0),
    })
}

/// Ultrasonic range in centimetres.
fn simulate_distance() -> SensorRecord {
    let mut rng = rand::rng();
    SensorRecord::Distance {
        value: rng.random_range(2.0..400.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn both_nodes_produce_parseable_payloads() {
        let tags = NodeTags::default();
        let receiver = MockLinkReceiver::new(10, 15, tags.clone());
        let cancel = CancellationToken::new();
        let mut rx = receiver.start(cancel.clone()).await.unwrap();

        let mut imu = 0;
        let mut distance = 0;
        while imu == 0 || distance == 0 {
            let Some(LinkData::Payload { payload, .. }) = rx.recv().await else {
                panic!("mock link should only yield payloads");
            };
            match SensorRecord::parse(&payload, &tags).unwrap() {
                SensorRecord::Imu(_) => imu += 1,
                SensorRecord::Distance { .. } => distance += 1,
            }
        }

        cancel.cancel();
    }
}
