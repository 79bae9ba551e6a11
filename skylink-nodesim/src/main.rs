use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use serde::Deserialize;
use skylink_core::protocol::encode;
use skylink_core::{Address64, FrameError, ImuReading, LinkMode, NodeTags, SensorRecord};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "skylink-nodesim")]
#[command(about = "Simulate the IMU and distance nodes against a skylink-sink TCP link")]
struct Cli {
    /// Path to the simulator configuration file
    #[arg(short, long, default_value = "skylink-nodesim.toml")]
    config: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SimConfig {
    /// Address of the sink's TCP link
    sink_addr: SocketAddr,
    #[serde(default)]
    mode: LinkMode,
    /// 64-bit destination address written into API frames
    #[serde(default = "default_destination")]
    destination: Address64,
    #[serde(default)]
    nodes: NodeTags,
    imu_interval_ms: u64,
    distance_interval_ms: u64,
}

fn default_destination() -> Address64 {
    Address64::COORDINATOR
}

impl SimConfig {
    fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> color_eyre::Result<Self> {
        let config: SimConfig = toml::from_str(content)?;
        if config.imu_interval_ms == 0 || config.distance_interval_ms == 0 {
            color_eyre::eyre::bail!("node intervals must be greater than zero");
        }
        Ok(config)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sink_addr: "127.0.0.1:9100".parse().unwrap(),
            mode: LinkMode::Api,
            destination: Address64::COORDINATOR,
            nodes: NodeTags::default(),
            imu_interval_ms: 500,
            distance_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Imu,
    Distance,
}

impl NodeKind {
    fn sample(self) -> SensorRecord {
        let mut rng = rand::rng();
        match self {
            NodeKind::Imu => SensorRecord::Imu(ImuReading {
                ax: rng.random_range(-0.5..0.5),
                ay: rng.random_range(-0.5..0.5),
                az: rng.random_range(9.5..10.1),
                gx: rng.random_range(-5.0..5.0),
                gy: rng.random_range(-5.0..5.0),
                gz: rng.random_range(-5.0..5.0),
            }),
            NodeKind::Distance => SensorRecord::Distance {
                value: rng.random_range(2.0..400.0),
            },
        }
    }
}

/// Bytes a node puts on the wire for one record.
fn wire_bytes(
    record: &SensorRecord,
    tags: &NodeTags,
    mode: LinkMode,
    destination: Address64,
) -> Result<Vec<u8>, FrameError> {
    let payload = record.to_payload(tags);
    match mode {
        LinkMode::Api => encode(payload.as_bytes(), destination),
        LinkMode::Transparent => Ok(format!("{payload}\r\n").into_bytes()),
    }
}

/// Run one node until shutdown, reconnecting to the sink when the
/// connection drops.
async fn run_node(
    kind: NodeKind,
    interval: Duration,
    config: &SimConfig,
    cancel: CancellationToken,
) {
    let mut backoff = Duration::from_secs(1);

    while !cancel.is_cancelled() {
        let mut stream = match TcpStream::connect(config.sink_addr).await {
            Ok(stream) => {
                info!(addr = %config.sink_addr, "Connected to sink");
                backoff = Duration::from_secs(1);
                stream
            }
            Err(e) => {
                warn!(error = %e, backoff_secs = backoff.as_secs(), "Failed to connect to sink, will retry");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        let mut ticker = tokio::time::interval(interval);
        let mut sent = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let record = kind.sample();
            let bytes = match wire_bytes(&record, &config.nodes, config.mode, config.destination) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "Failed to encode record");
                    continue;
                }
            };

            if let Err(e) = stream.write_all(&bytes).await {
                warn!(error = %e, sent, "Connection to sink lost");
                break;
            }
            sent += 1;
            debug!(?record, sent, "Sent record");
        }
    }

    info!("Node stopped");
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tracing=info,skylink_nodesim=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading simulator configuration");
        SimConfig::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        SimConfig::default()
    };

    info!(
        sink_addr = %config.sink_addr,
        mode = ?config.mode,
        destination = %config.destination,
        "Starting node simulator"
    );

    let cancel = CancellationToken::new();
    let imu_interval = Duration::from_millis(config.imu_interval_ms);
    let distance_interval = Duration::from_millis(config.distance_interval_ms);

    let imu = run_node(NodeKind::Imu, imu_interval, &config, cancel.clone())
        .instrument(info_span!("node", tag = %config.nodes.imu));
    let distance = run_node(NodeKind::Distance, distance_interval, &config, cancel.clone())
        .instrument(info_span!("node", tag = %config.nodes.distance));

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
        }
        cancel.cancel();
    };

    tokio::join!(imu, distance, shutdown);

    info!("Node simulator shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylink_core::protocol::{decode, decode_line};

    #[test]
    fn api_bytes_carry_the_payload() {
        let tags = NodeTags::default();
        let record = SensorRecord::Distance { value: 12.5 };
        let dest = Address64::from_u64(0x0013_A200_400A_0127);

        let bytes = wire_bytes(&record, &tags, LinkMode::Api, dest).unwrap();
        let (frame, rest) = decode(&bytes).unwrap();

        assert!(rest.is_empty());
        assert_eq!(frame.address, dest);
        assert_eq!(frame.payload, "ESP,12.50");
    }

    #[test]
    fn transparent_bytes_are_crlf_lines() {
        let tags = NodeTags::default();
        let record = NodeKind::Imu.sample();

        let bytes = wire_bytes(&record, &tags, LinkMode::Transparent, Address64::COORDINATOR).unwrap();
        assert!(bytes.ends_with(b"\r\n"));

        let (line, rest) = decode_line(&bytes).unwrap();
        assert!(rest.is_empty());
        assert!(matches!(
            SensorRecord::parse(&line, &tags),
            Ok(SensorRecord::Imu(_))
        ));
    }

    #[test]
    fn config_parses() {
        let config: SimConfig = toml::from_str(
            r#"
            sink_addr = "127.0.0.1:9100"
            mode = "transparent"
            destination = "0013A200400A0127"
            imu_interval_ms = 200
            distance_interval_ms = 400

            [nodes]
            imu = "IMU"
            distance = "DIST"
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, LinkMode::Transparent);
        assert_eq!(config.destination.as_u64(), 0x0013_A200_400A_0127);
        assert_eq!(config.nodes, NodeTags::new("IMU", "DIST"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let result = SimConfig::from_toml(
            r#"
            sink_addr = "127.0.0.1:9100"
            imu_interval_ms = 0
            distance_interval_ms = 400
            "#,
        );
        assert!(result.is_err());
    }
}
