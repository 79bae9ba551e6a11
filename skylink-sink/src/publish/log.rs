use async_trait::async_trait;
use skylink_core::CombinedSnapshot;
use tracing::info;

use super::{PublishError, PublishReceipt, Publisher};

/// Publisher that only logs the snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, snapshot: &CombinedSnapshot) -> Result<PublishReceipt, PublishError> {
        info!(
            ax = ?snapshot.ax,
            ay = ?snapshot.ay,
            az = ?snapshot.az,
            gx = ?snapshot.gx,
            gy = ?snapshot.gy,
            gz = ?snapshot.gz,
            distance = ?snapshot.distance,
            "Snapshot"
        );
        Ok(PublishReceipt::default())
    }
}
