use std::io::{self, ErrorKind, Read};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use skylink_core::{LinkMode, StreamDecoder};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

use super::{LinkData, LinkError, LinkReceiver, stream::ready};

/// Bound on a single blocking read, so the reader notices shutdown while the
/// radio is quiet.
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 256;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reads the coordinator radio over a serial port.
///
/// The port is opened 8N1 without flow control at the configured baud rate
/// and read on a dedicated thread. When the adapter goes away (USB replug)
/// the thread reopens it with capped exponential backoff.
pub struct SerialLinkReceiver {
    path: String,
    baud_rate: u32,
    mode: LinkMode,
}

impl SerialLinkReceiver {
    pub fn new(path: impl Into<String>, baud_rate: u32, mode: LinkMode) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            mode,
        }
    }
}

fn open(path: &str, baud_rate: u32) -> serialport::Result<Box<dyn SerialPort>> {
    serialport::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()
}

#[async_trait]
impl LinkReceiver for SerialLinkReceiver {
    type Error = serialport::Error;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<LinkData>, Self::Error> {
        let (tx, rx) = mpsc::channel(100);

        let port = open(&self.path, self.baud_rate)?;
        info!(path = %self.path, baud_rate = self.baud_rate, mode = ?self.mode, "Serial link opened");

        let path = self.path.clone();
        let baud_rate = self.baud_rate;
        let mode = self.mode;
        thread::Builder::new()
            .name("serial-link".to_owned())
            .spawn(move || run_serial_loop(port, &path, baud_rate, mode, tx, cancel))
            .map_err(serialport::Error::from)?;

        Ok(rx)
    }
}

/// Read the port until shutdown, reopening it when it goes away.
fn run_serial_loop(
    port: Box<dyn SerialPort>,
    path: &str,
    baud_rate: u32,
    mode: LinkMode,
    tx: mpsc::Sender<LinkData>,
    cancel: CancellationToken,
) {
    let _span = info_span!("serial_link", path, baud_rate, ?mode).entered();

    let mut port = Some(port);
    let mut backoff = Backoff::new();

    while !cancel.is_cancelled() {
        let mut current = match port.take() {
            Some(port) => port,
            None => match open(path, baud_rate) {
                Ok(port) => {
                    info!("Serial link reopened");
                    backoff.reset();
                    port
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(error = %e, backoff_secs = delay.as_secs(), "Failed to reopen serial port, will retry");
                    if sleep_unless_cancelled(delay, &cancel) {
                        break;
                    }
                    continue;
                }
            },
        };

        match read_port(&mut current, mode, &tx, &cancel) {
            Ok(()) => break,
            Err(LinkError::ChannelClosed) => {
                error!("Internal link channel closed");
                break;
            }
            Err(e) => error!(error = %e, "Serial read failed"),
        }

        drop(current);
        if sleep_unless_cancelled(backoff.next_delay(), &cancel) {
            break;
        }
    }

    info!("Serial link closed");
}

/// Decode everything read from `port` into `tx` until cancelled.
///
/// Read timeouts are the quiet-line case and only serve to poll `cancel`.
/// End of stream means the device went away and is reported as an error.
fn read_port<R>(
    port: &mut R,
    mode: LinkMode,
    tx: &mpsc::Sender<LinkData>,
    cancel: &CancellationToken,
) -> Result<(), LinkError>
where
    R: Read + ?Sized,
{
    let mut decoder = StreamDecoder::new(mode);
    let mut tmp = [0u8; READ_CHUNK];

    while !cancel.is_cancelled() {
        let n = match port.read(&mut tmp) {
            Ok(0) => return Err(io::Error::from(ErrorKind::UnexpectedEof).into()),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => continue,
            Err(e) => return Err(e.into()),
        };

        decoder.push(&tmp[..n]);
        for data in ready(&mut decoder) {
            tx.blocking_send(data)
                .map_err(|_| LinkError::ChannelClosed)?;
        }
    }

    info!(buffered = decoder.buffered(), "Shutdown signal received");
    Ok(())
}

/// Capped exponential delay between reopen attempts.
#[derive(Debug)]
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            next: INITIAL_BACKOFF,
        }
    }

    fn reset(&mut self) {
        self.next = INITIAL_BACKOFF;
    }

    /// The delay to wait now; the following one doubles up to the cap.
    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(MAX_BACKOFF);
        delay
    }
}

/// Returns true when cancelled before `duration` elapsed.
fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + duration;
    while !cancel.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep((deadline - now).min(READ_TIMEOUT));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylink_core::Address64;
    use skylink_core::protocol::encode;
    use std::collections::VecDeque;
    use std::sync::mpsc as std_mpsc;

    /// A port that replays `chunks`, then times out on every read like an
    /// idle radio.
    struct ScriptedPort {
        chunks: VecDeque<Vec<u8>>,
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => {
                    thread::sleep(Duration::from_millis(5));
                    Err(ErrorKind::TimedOut.into())
                }
            }
        }
    }

    #[test]
    fn frames_are_forwarded_across_reads() {
        let frame = encode(b"ESP,42.00", Address64::COORDINATOR).unwrap();
        let (head, tail) = frame.split_at(7);
        let mut port = ScriptedPort {
            chunks: VecDeque::from([head.to_vec(), tail.to_vec()]),
        };
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let reader_cancel = cancel.clone();
        let reader = thread::spawn(move || read_port(&mut port, LinkMode::Api, &tx, &reader_cancel));

        match rx.blocking_recv() {
            Some(LinkData::Payload { payload, .. }) => assert_eq!(payload, "ESP,42.00"),
            other => panic!("unexpected {other:?}"),
        }

        cancel.cancel();
        assert!(reader.join().unwrap().is_ok());
    }

    #[test]
    fn idle_port_stops_promptly_on_cancel() {
        let mut port = ScriptedPort {
            chunks: VecDeque::new(),
        };
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = std_mpsc::channel();

        let reader_cancel = cancel.clone();
        thread::spawn(move || {
            let result = read_port(&mut port, LinkMode::Api, &tx, &reader_cancel);
            let _ = done_tx.send(result.is_ok());
        });

        thread::sleep(Duration::from_millis(50));
        cancel.cancel();

        assert_eq!(done_rx.recv_timeout(Duration::from_secs(2)), Ok(true));
    }

    #[test]
    fn end_of_stream_is_an_error() {
        struct Unplugged;
        impl Read for Unplugged {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Ok(0)
            }
        }

        let (tx, _rx) = mpsc::channel(8);
        let result = read_port(&mut Unplugged, LinkMode::Api, &tx, &CancellationToken::new());
        assert!(matches!(result, Err(LinkError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof));
    }

    #[test]
    fn backoff_doubles_to_cap_and_resets_after_reopen() {
        let mut backoff = Backoff::new();
        let delays: Vec<_> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), INITIAL_BACKOFF);
    }

    #[test]
    fn backoff_sleep_ends_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = Instant::now();
        assert!(sleep_unless_cancelled(MAX_BACKOFF, &cancel));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn missing_device_fails_to_start() {
        let receiver = SerialLinkReceiver::new("/nonexistent/ttySKYLINK0", 9600, LinkMode::Api);
        assert!(receiver.start(CancellationToken::new()).await.is_err());
    }
}
