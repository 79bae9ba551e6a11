use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::gate::PublishGate;
use crate::record::{ImuReading, SensorRecord};

/// Last value seen for every published field.
///
/// Fields are updated independently, so a snapshot can pair an IMU reading
/// and a distance reading that arrived at different times. There is no
/// freshness check between the two streams.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CombinedSnapshot {
    pub ax: Option<f64>,
    pub ay: Option<f64>,
    pub az: Option<f64>,
    pub gx: Option<f64>,
    pub gy: Option<f64>,
    pub gz: Option<f64>,
    pub distance: Option<f64>,
}

impl CombinedSnapshot {
    /// Fold one record into the snapshot.
    pub fn apply(&mut self, record: &SensorRecord) {
        match *record {
            SensorRecord::Imu(ImuReading {
                ax,
                ay,
                az,
                gx,
                gy,
                gz,
            }) => {
                self.ax = Some(ax);
                self.ay = Some(ay);
                self.az = Some(az);
                self.gx = Some(gx);
                self.gy = Some(gy);
                self.gz = Some(gz);
            }
            SensorRecord::Distance { value } => {
                self.distance = Some(value);
            }
        }
    }

    /// Values in publishing order: the six IMU axes, then distance.
    pub fn fields(&self) -> [Option<f64>; 7] {
        [
            self.ax,
            self.ay,
            self.az,
            self.gx,
            self.gy,
            self.gz,
            self.distance,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(Option::is_none)
    }
}

/// Merges the two node streams and throttles publishing of the result.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    snapshot: CombinedSnapshot,
    gate: PublishGate,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, record: &SensorRecord) {
        self.snapshot.apply(record);
    }

    pub fn snapshot(&self) -> CombinedSnapshot {
        self.snapshot
    }

    pub fn gate(&self) -> &PublishGate {
        &self.gate
    }

    /// Apply `record`, then ask the gate whether to publish. Returns the
    /// snapshot to send when it fires.
    pub fn ingest(
        &mut self,
        record: &SensorRecord,
        now: Timestamp,
        interval: SignedDuration,
    ) -> Option<CombinedSnapshot> {
        self.apply(record);
        self.gate
            .should_fire(now, interval)
            .then_some(self.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NodeTags;

    fn imu() -> SensorRecord {
        SensorRecord::Imu(ImuReading {
            ax: 0.10,
            ay: 0.20,
            az: 9.81,
            gx: 1.0,
            gy: 2.0,
            gz: 3.0,
        })
    }

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_second(secs).unwrap()
    }

    #[test]
    fn fresh_snapshot_is_unset() {
        let snapshot = CombinedSnapshot::default();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.fields(), [None; 7]);
    }

    #[test]
    fn distance_leaves_imu_fields_alone() {
        let mut snapshot = CombinedSnapshot::default();
        snapshot.apply(&imu());
        let before = snapshot;

        snapshot.apply(&SensorRecord::Distance { value: 7.5 });

        assert_eq!(snapshot.distance, Some(7.5));
        assert_eq!(snapshot.fields()[..6], before.fields()[..6]);
    }

    #[test]
    fn imu_overwrites_all_six_axes() {
        let mut snapshot = CombinedSnapshot::default();
        snapshot.apply(&SensorRecord::Distance { value: 1.0 });
        snapshot.apply(&imu());
        snapshot.apply(&SensorRecord::Imu(ImuReading::default()));

        assert_eq!(
            snapshot.fields(),
            [
                Some(0.0),
                Some(0.0),
                Some(0.0),
                Some(0.0),
                Some(0.0),
                Some(0.0),
                Some(1.0)
            ]
        );
    }

    #[test]
    fn rejected_payload_never_touches_snapshot() {
        let tags = NodeTags::new("IMU", "DIST");
        let mut aggregator = Aggregator::new();
        aggregator.apply(&imu());
        let before = aggregator.snapshot();

        if let Ok(record) = SensorRecord::parse("IMU,9,9,9,oops,9,9", &tags) {
            aggregator.apply(&record);
        }

        assert_eq!(aggregator.snapshot(), before);
    }

    #[test]
    fn ingest_merges_streams_within_one_interval() {
        let interval = SignedDuration::from_secs(15);
        let mut aggregator = Aggregator::new();

        let first = aggregator.ingest(&imu(), at(1_000), interval);
        let second = aggregator.ingest(&SensorRecord::Distance { value: 42.0 }, at(1_005), interval);

        // first record after startup fires with what it has
        let first = first.expect("first record fires");
        assert_eq!(first.az, Some(9.81));
        assert_eq!(first.distance, None);
        assert_eq!(second, None);

        let third = aggregator.ingest(&SensorRecord::Distance { value: 43.0 }, at(1_016), interval);
        assert_eq!(
            third,
            Some(CombinedSnapshot {
                ax: Some(0.10),
                ay: Some(0.20),
                az: Some(9.81),
                gx: Some(1.0),
                gy: Some(2.0),
                gz: Some(3.0),
                distance: Some(43.0),
            })
        );
    }
}
