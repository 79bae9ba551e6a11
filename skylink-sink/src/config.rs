use std::net::SocketAddr;
use std::path::Path;

use color_eyre::eyre::bail;
use jiff::SignedDuration;
use serde::Deserialize;
use skylink_core::{LinkMode, NodeTags};

/// Environment variable consulted when the config carries no API key.
pub const API_KEY_ENV: &str = "THINGSPEAK_API_KEY";
pub const THINGSPEAK_URL: &str = "https://api.thingspeak.com/update";
/// Serial speed of the radios as shipped.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub link: LinkConfig,
    /// Tags identifying the two sensor nodes.
    #[serde(default)]
    pub nodes: NodeTags,
    pub publish: PublishConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address for the HTTP health/stats server to listen on
    pub http_addr: SocketAddr,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LinkConfig {
    /// Serial port of the coordinator radio, opened 8N1.
    Serial {
        path: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        #[serde(default)]
        mode: LinkMode,
    },
    /// Accept link streams over TCP, e.g. from a serial-to-network bridge.
    Tcp {
        addr: SocketAddr,
        #[serde(default)]
        mode: LinkMode,
    },
    Mock {
        /// Interval in milliseconds between IMU node frames
        imu_interval_ms: u64,
        /// Interval in milliseconds between distance node frames
        distance_interval_ms: u64,
    },
}

#[derive(Debug, Deserialize)]
pub struct PublishConfig {
    /// Minimum seconds between two publishes
    pub interval_secs: u64,
    pub target: PublisherConfig,
}

impl PublishConfig {
    pub fn interval(&self) -> SignedDuration {
        SignedDuration::from_secs(i64::try_from(self.interval_secs).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PublisherConfig {
    ThingSpeak {
        #[serde(default = "default_thingspeak_url")]
        url: String,
        /// Channel write key; falls back to `THINGSPEAK_API_KEY`
        api_key: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// Log snapshots instead of sending them anywhere.
    Log,
}

fn default_thingspeak_url() -> String {
    THINGSPEAK_URL.to_owned()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config document.
    pub fn from_toml(content: &str) -> color_eyre::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> color_eyre::Result<()> {
        match self.link {
            LinkConfig::Mock {
                imu_interval_ms,
                distance_interval_ms,
            } if imu_interval_ms == 0 || distance_interval_ms == 0 => {
                bail!("mock link intervals must be greater than zero")
            }
            LinkConfig::Serial { baud_rate: 0, .. } => {
                bail!("serial baud_rate must be greater than zero")
            }
            _ => {}
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link: LinkConfig::Mock {
                imu_interval_ms: 500,
                distance_interval_ms: 1000,
            },
            nodes: NodeTags::default(),
            publish: PublishConfig {
                interval_secs: 15,
                target: PublisherConfig::Log,
            },
            server: ServerConfig {
                http_addr: "0.0.0.0:8082".parse().unwrap(),
            },
        }
    }
}
