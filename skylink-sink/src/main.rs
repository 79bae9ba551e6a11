use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::eyre;
use skylink_sink::config::API_KEY_ENV;
use skylink_sink::{
    Config, LinkConfig, LinkReceiver, LogPublisher, MockLinkReceiver, Publisher, PublisherConfig,
    RelayState, SerialLinkReceiver, TcpLinkReceiver, ThingSpeakPublisher, http, run_processor,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "skylink-sink")]
#[command(about = "Relays radio sensor frames to ThingSpeak")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "skylink-sink.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tracing=info,skylink_sink=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    info!(
        http_addr = %config.server.http_addr,
        interval_secs = config.publish.interval_secs,
        imu_tag = %config.nodes.imu,
        distance_tag = %config.nodes.distance,
        "Starting skylink-sink"
    );

    match &config.publish.target {
        PublisherConfig::ThingSpeak {
            url,
            api_key,
            timeout_secs,
        } => {
            let api_key = match api_key {
                Some(key) => key.clone(),
                None => std::env::var(API_KEY_ENV).map_err(|_| {
                    eyre!("no ThingSpeak API key in the config and {API_KEY_ENV} is not set")
                })?,
            };
            info!(%url, "Publishing to ThingSpeak");
            let publisher =
                ThingSpeakPublisher::new(url, api_key, Duration::from_secs(*timeout_secs))?;
            run_sink(config, publisher).await
        }
        PublisherConfig::Log => {
            info!("Logging snapshots instead of publishing");
            run_sink(config, LogPublisher).await
        }
    }
}

async fn run_sink<P: Publisher>(config: Config, publisher: P) -> color_eyre::Result<()> {
    // Create link receiver based on config
    match &config.link {
        LinkConfig::Serial {
            path,
            baud_rate,
            mode,
        } => {
            info!(%path, baud_rate, ?mode, "Using serial link");
            let receiver = SerialLinkReceiver::new(path, *baud_rate, *mode);
            run_link_receiver(receiver, publisher, config).await
        }
        LinkConfig::Tcp { addr, mode } => {
            info!(%addr, ?mode, "Using TCP link");
            let receiver = TcpLinkReceiver::new(*addr, *mode);
            run_link_receiver(receiver, publisher, config).await
        }
        LinkConfig::Mock {
            imu_interval_ms,
            distance_interval_ms,
        } => {
            info!(imu_interval_ms, distance_interval_ms, "Using mock link");
            let receiver = MockLinkReceiver::new(
                *imu_interval_ms,
                *distance_interval_ms,
                config.nodes.clone(),
            );
            run_link_receiver(receiver, publisher, config).await
        }
    }
}

async fn run_link_receiver<L: LinkReceiver, P: Publisher>(
    link_receiver: L,
    publisher: P,
    config: Config,
) -> color_eyre::Result<()> {
    let cancel = CancellationToken::new();
    let state = RelayState::new();

    // Opening the transport is the last fatal step
    let link_rx = link_receiver.start(cancel.clone()).await?;

    let processor_handle = tokio::spawn(run_processor(
        link_rx,
        state.clone(),
        Arc::new(publisher),
        config.nodes.clone(),
        config.publish.interval(),
        cancel.clone(),
    ));

    // HTTP server
    let http_addr = config.server.http_addr;
    let axum_listener = TcpListener::bind(http_addr).await?;
    info!(%http_addr, "HTTP server listening");

    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    if let Err(e) = http::serve(axum_listener, state, cancel.clone(), ctrl_c).await {
        error!(error = ?e, "HTTP server error");
    }
    info!("HTTP server shut down");

    // Wait for in-flight publishes
    let _ = processor_handle.await;

    info!("skylink-sink shut down complete");
    Ok(())
}
