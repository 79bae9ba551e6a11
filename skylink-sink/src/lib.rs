pub mod config;
pub mod http;
pub mod link;
pub mod pipeline;
pub mod publish;
pub mod state;

pub use config::{Config, LinkConfig, PublishConfig, PublisherConfig, ServerConfig};
pub use link::mock::MockLinkReceiver;
pub use link::serial::SerialLinkReceiver;
pub use link::tcp::TcpLinkReceiver;
pub use link::{LinkData, LinkError, LinkReceiver};
pub use pipeline::run_processor;
pub use publish::log::LogPublisher;
pub use publish::memory::MemoryPublisher;
pub use publish::thingspeak::ThingSpeakPublisher;
pub use publish::{PublishError, PublishReceipt, Publisher};
pub use state::{DropReason, RelayState, RelayStats};
