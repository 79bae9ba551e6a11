//! Radio link protocol and sensor aggregation for the skylink relay.
//!
//! Two sensor nodes share one packet radio channel: an IMU node and a
//! distance node. Their payloads arrive either wrapped in API frames or as
//! plain lines, are parsed into [`SensorRecord`]s and merged by the
//! [`Aggregator`] into a [`CombinedSnapshot`] which a [`PublishGate`]
//! releases at a bounded rate.

pub mod aggregate;
pub mod gate;
pub mod protocol;
pub mod record;

pub use aggregate::{Aggregator, CombinedSnapshot};
pub use gate::PublishGate;
pub use protocol::{Address64, Decoded, FrameError, LinkMode, StreamDecoder};
pub use record::{ImuReading, NodeTags, ParseError, SensorRecord};
