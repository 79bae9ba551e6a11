use std::time::Duration;

use async_trait::async_trait;
use skylink_core::CombinedSnapshot;
use tracing::{debug, instrument};

use super::{PublishError, PublishReceipt, Publisher};

/// Writes snapshots to a ThingSpeak channel through its update API.
///
/// Fields 1 to 6 carry the IMU axes (ax, ay, az, gx, gy, gz) and field 7 the
/// distance. Fields without a value yet are left out of the update.
pub struct ThingSpeakPublisher {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl ThingSpeakPublisher {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(PublishError::MissingApiKey);
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }

    fn params(&self, snapshot: &CombinedSnapshot) -> Vec<(String, String)> {
        let mut params = vec![("api_key".to_owned(), self.api_key.clone())];
        for (i, value) in snapshot.fields().into_iter().enumerate() {
            if let Some(value) = value {
                params.push((format!("field{}", i + 1), value.to_string()));
            }
        }
        params
    }
}

#[async_trait]
impl Publisher for ThingSpeakPublisher {
    #[instrument(name = "thingspeak_publish", skip_all)]
    async fn publish(&self, snapshot: &CombinedSnapshot) -> Result<PublishReceipt, PublishError> {
        let resp = self
            .client
            .post(&self.url)
            .query(&self.params(snapshot))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(PublishError::Status { status, body });
        }

        // The update API answers with the new entry id, or 0 when the
        // update was not stored.
        let entry_id = body.trim().parse::<u64>().ok();
        if entry_id == Some(0) {
            return Err(PublishError::Rejected);
        }

        debug!(?entry_id, "ThingSpeak update stored");
        Ok(PublishReceipt { entry_id })
    }
}
