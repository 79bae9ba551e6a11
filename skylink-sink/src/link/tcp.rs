use async_trait::async_trait;
use skylink_core::LinkMode;
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io,
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, instrument};

use super::{LinkData, LinkReceiver, stream::read_link};

/// Accepts link streams over TCP.
///
/// Each accepted connection carries one radio's byte stream, for example a
/// serial-to-network bridge in front of the coordinator or the node
/// simulator. Connections are decoded independently and feed one channel.
pub struct TcpLinkReceiver {
    addr: SocketAddr,
    mode: LinkMode,
}

impl TcpLinkReceiver {
    pub fn new(addr: SocketAddr, mode: LinkMode) -> Self {
        Self { addr, mode }
    }
}

#[async_trait]
impl LinkReceiver for TcpLinkReceiver {
    type Error = io::Error;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<LinkData>, Self::Error> {
        let (tx, rx) = mpsc::channel(100);
        let addr = self.addr;

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, mode = ?self.mode, "TCP link receiver started");

        tokio::spawn(run_server_loop(listener, tx, cancel, self.mode));

        Ok(rx)
    }
}

#[instrument(name = "link_server", skip_all, fields(?mode))]
async fn run_server_loop(
    listener: TcpListener,
    tx: mpsc::Sender<LinkData>,
    cancel: CancellationToken,
    mode: LinkMode,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Closing TCP link receiver");
                break;
            }
            client = listener.accept() => {
                match client {
                    Ok((stream, addr)) => {
                        info!(%addr, "Link connected");

                        let cancel = cancel.clone();
                        let tx = tx.clone();

                        tokio::spawn(
                            handle_link(stream, tx, cancel, mode)
                                .instrument(info_span!("link_connection", %addr)),
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        if is_transient_error(&e) {
                            sleep(Duration::from_millis(100)).await;
                        } else {
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn is_transient_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        e.kind(),
        ConnectionRefused | ConnectionAborted | ConnectionReset | OutOfMemory | Other
    )
}

async fn handle_link(
    stream: TcpStream,
    tx: mpsc::Sender<LinkData>,
    cancel: CancellationToken,
    mode: LinkMode,
) {
    match read_link(stream, mode, tx, cancel).await {
        Ok(()) => info!("Link disconnected"),
        Err(e) => error!(error = %e, "Link closed with error"),
    }
}
