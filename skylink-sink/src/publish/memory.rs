use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use skylink_core::CombinedSnapshot;
use tokio::sync::Mutex;

use super::{PublishError, PublishReceipt, Publisher};

/// Publisher that keeps every snapshot in memory.
///
/// While `fail` is set, calls are recorded and then answered with
/// `PublishError::Rejected`.
#[derive(Clone, Default)]
pub struct MemoryPublisher {
    published: Arc<Mutex<Vec<CombinedSnapshot>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<CombinedSnapshot> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, snapshot: &CombinedSnapshot) -> Result<PublishReceipt, PublishError> {
        let mut published = self.published.lock().await;
        published.push(*snapshot);

        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Rejected);
        }
        Ok(PublishReceipt {
            entry_id: Some(published.len() as u64),
        })
    }
}
