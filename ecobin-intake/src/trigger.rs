//! Sensor trigger line.
//!
//! The sensor board writes newline-terminated values over serial. A line
//! equal to the configured trigger value means "deposit detected"; every
//! other line is ignored. Transport failures never end the reader: the
//! channel is reopened after a fixed delay for as long as the process runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout_at};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::TriggerConfig;
use crate::error::TriggerError;

/// A single "deposit detected" signal. Lives only inside the intake loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub at: DateTime<Utc>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerPoll {
    Event(TriggerEvent),
    /// Poll interval elapsed without a trigger. Not an error.
    Idle,
    /// The far end closed the stream.
    Closed,
}

#[async_trait]
pub trait TriggerSource: Send {
    /// Waits at most one poll interval for the next trigger.
    async fn next_event(&mut self) -> Result<TriggerPoll, TriggerError>;
}

/// Something that can (re)open a `TriggerSource`.
#[async_trait]
pub trait TriggerChannel: Send + Sync {
    async fn open(&self) -> Result<Box<dyn TriggerSource>, TriggerError>;

    fn describe(&self) -> String;
}

/// Longest sensor line kept; anything longer is line noise and is discarded.
pub const MAX_LINE_BYTES: usize = 256;

/// Line protocol over any buffered reader.
pub struct LineTriggerSource<R> {
    reader: R,
    trigger_value: String,
    poll_interval: Duration,
    // Survives a poll timeout so a line split across polls is not lost.
    pending: Vec<u8>,
    // Set while skipping the rest of an oversized line.
    discarding: bool,
}

impl<R> LineTriggerSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, trigger_value: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            reader,
            trigger_value: trigger_value.into(),
            poll_interval,
            pending: Vec::new(),
            discarding: false,
        }
    }

    fn drop_oversized_partial(&mut self) {
        if self.pending.len() > MAX_LINE_BYTES {
            warn!("Discarding oversized sensor line ({} bytes so far)", self.pending.len());
            self.pending.clear();
            self.discarding = true;
        }
    }
}

#[async_trait]
impl<R> TriggerSource for LineTriggerSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_event(&mut self) -> Result<TriggerPoll, TriggerError> {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            // read_until keeps partial bytes in `pending` if the timeout cancels it.
            let read = match timeout_at(deadline, self.reader.read_until(b'\n', &mut self.pending)).await {
                Err(_elapsed) => {
                    self.drop_oversized_partial();
                    return Ok(TriggerPoll::Idle);
                }
                Ok(read) => read.map_err(|e| TriggerError::Transport(e.to_string()))?,
            };

            if self.discarding || self.pending.len() > MAX_LINE_BYTES {
                let complete = read == 0 || self.pending.last() == Some(&b'\n');
                if !self.discarding {
                    warn!("Discarding oversized sensor line ({} bytes)", self.pending.len());
                }
                self.pending.clear();
                self.discarding = !complete;
                continue;
            }

            if read == 0 {
                if self.pending.is_empty() {
                    return Ok(TriggerPoll::Closed);
                }
                debug!("Trigger stream ended mid-line");
            }

            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line != self.trigger_value {
                debug!("Ignoring sensor line {:?}", line);
                continue;
            }
            return Ok(TriggerPoll::Event(TriggerEvent {
                at: Utc::now(),
                raw: line.to_string(),
            }));
        }
    }
}

/// Serial port opened through `tokio-serial`.
pub struct SerialTriggerChannel {
    config: TriggerConfig,
}

impl SerialTriggerChannel {
    pub fn new(config: TriggerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TriggerChannel for SerialTriggerChannel {
    async fn open(&self) -> Result<Box<dyn TriggerSource>, TriggerError> {
        let port = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .open_native_async()
            .map_err(|e| TriggerError::Open {
                channel: self.describe(),
                reason: e.to_string(),
            })?;
        info!("Listening for triggers on {}", self.describe());
        Ok(Box::new(LineTriggerSource::new(
            BufReader::new(port),
            self.config.trigger_value.clone(),
            self.config.poll_interval,
        )))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.config.port, self.config.baud_rate)
    }
}

/// Returns true once shutdown has been requested.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Reads triggers until shutdown, forwarding them to the agent.
///
/// Events are handed over with `try_send`: when the agent is busy and the
/// channel is full, the event is dropped here rather than buffered unbounded.
pub async fn run_trigger_reader(
    channel: Arc<dyn TriggerChannel>,
    tx: mpsc::Sender<TriggerEvent>,
    reconnect_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    'reopen: loop {
        if *shutdown.borrow() {
            break;
        }

        let mut source = match channel.open().await {
            Ok(source) => source,
            Err(e) => {
                warn!("{}; retrying in {:?}", e, reconnect_delay);
                if sleep_or_shutdown(reconnect_delay, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        loop {
            if *shutdown.borrow() {
                break 'reopen;
            }
            match source.next_event().await {
                Ok(TriggerPoll::Event(event)) => match tx.try_send(event) {
                    Ok(()) => debug!("Trigger forwarded to intake agent"),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!("Intake agent busy; dropping trigger");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        info!("Intake agent gone; stopping trigger reader");
                        break 'reopen;
                    }
                },
                Ok(TriggerPoll::Idle) => {}
                Ok(TriggerPoll::Closed) => {
                    warn!("Trigger channel {} closed; reopening in {:?}", channel.describe(), reconnect_delay);
                    break;
                }
                Err(e) => {
                    warn!("{}; reopening in {:?}", e, reconnect_delay);
                    break;
                }
            }
        }

        drop(source);
        if sleep_or_shutdown(reconnect_delay, &mut shutdown).await {
            break;
        }
    }
    info!("Trigger reader stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncWriteExt;

    const POLL: Duration = Duration::from_millis(30);

    #[tokio::test]
    async fn only_the_trigger_value_fires() {
        let data: &[u8] = b"0\n\n 1 \nnoise\r\n1\n";
        let mut src = LineTriggerSource::new(BufReader::new(data), "1", POLL);

        assert!(matches!(src.next_event().await.unwrap(), TriggerPoll::Event(e) if e.raw == "1"));
        assert!(matches!(src.next_event().await.unwrap(), TriggerPoll::Event(_)));
        assert_eq!(src.next_event().await.unwrap(), TriggerPoll::Closed);
    }

    #[tokio::test]
    async fn chunked_serial_reads_are_reassembled() {
        let port = tokio_test::io::Builder::new()
            .read(b"0\n1")
            .read(b"\r\n")
            .read(b"1\n")
            .build();
        let mut src = LineTriggerSource::new(BufReader::new(port), "1", POLL);

        assert!(matches!(src.next_event().await.unwrap(), TriggerPoll::Event(_)));
        assert!(matches!(src.next_event().await.unwrap(), TriggerPoll::Event(_)));
        assert_eq!(src.next_event().await.unwrap(), TriggerPoll::Closed);
    }

    #[tokio::test]
    async fn quiet_line_is_idle_not_error() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut src = LineTriggerSource::new(BufReader::new(client), "1", POLL);

        assert_eq!(src.next_event().await.unwrap(), TriggerPoll::Idle);

        server.write_all(b"1\n").await.unwrap();
        assert!(matches!(src.next_event().await.unwrap(), TriggerPoll::Event(_)));
    }

    #[tokio::test]
    async fn line_split_across_polls_is_kept() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut src = LineTriggerSource::new(BufReader::new(client), "1", POLL);

        server.write_all(b"1").await.unwrap();
        assert_eq!(src.next_event().await.unwrap(), TriggerPoll::Idle);

        server.write_all(b"\n").await.unwrap();
        assert!(matches!(src.next_event().await.unwrap(), TriggerPoll::Event(e) if e.raw == "1"));
    }

    #[tokio::test]
    async fn oversized_lines_are_discarded() {
        let mut data = vec![b'x'; MAX_LINE_BYTES + 40];
        data.extend_from_slice(b"1\n1\n");
        let mut src = LineTriggerSource::new(BufReader::new(data.as_slice()), "1", POLL);

        // The "1" glued to the noise is part of the oversized line.
        assert!(matches!(src.next_event().await.unwrap(), TriggerPoll::Event(e) if e.raw == "1"));
        assert_eq!(src.next_event().await.unwrap(), TriggerPoll::Closed);
    }

    #[tokio::test]
    async fn runaway_partial_line_is_capped_across_polls() {
        let (client, mut server) = tokio::io::duplex(4096);
        let mut src = LineTriggerSource::new(BufReader::new(client), "1", POLL);

        server.write_all(&vec![b'x'; MAX_LINE_BYTES * 2]).await.unwrap();
        assert_eq!(src.next_event().await.unwrap(), TriggerPoll::Idle);
        assert!(src.pending.is_empty());

        // Tail of the noisy line, then a real trigger.
        server.write_all(b"xx1\n1\n").await.unwrap();
        assert!(matches!(src.next_event().await.unwrap(), TriggerPoll::Event(e) if e.raw == "1"));
    }

    /// Fails the first open, then serves one trigger per open.
    struct FlakyChannel {
        opens: AtomicUsize,
    }

    #[async_trait]
    impl TriggerChannel for FlakyChannel {
        async fn open(&self) -> Result<Box<dyn TriggerSource>, TriggerError> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return Err(TriggerError::Open {
                    channel: "fake".into(),
                    reason: "device unplugged".into(),
                });
            }
            let data: &'static [u8] = b"1\n";
            Ok(Box::new(LineTriggerSource::new(BufReader::new(data), "1", POLL)))
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    #[tokio::test]
    async fn reader_reopens_after_failures() {
        let channel = Arc::new(FlakyChannel { opens: AtomicUsize::new(0) });
        let (tx, mut rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader = tokio::spawn(run_trigger_reader(
            channel.clone(),
            tx,
            Duration::from_millis(5),
            shutdown_rx,
        ));

        // One event per successful open; two means it survived a close too.
        for _ in 0..2 {
            let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("trigger not forwarded")
                .expect("channel closed");
            assert_eq!(ev.raw, "1");
        }
        assert!(channel.opens.load(Ordering::SeqCst) >= 3);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), reader)
            .await
            .expect("reader did not stop")
            .unwrap();
    }

    /// Every source yields one trigger, then dies with a transport error.
    struct DroppingSource {
        served: bool,
    }

    #[async_trait]
    impl TriggerSource for DroppingSource {
        async fn next_event(&mut self) -> Result<TriggerPoll, TriggerError> {
            if self.served {
                return Err(TriggerError::Transport("device reset".into()));
            }
            self.served = true;
            Ok(TriggerPoll::Event(TriggerEvent { at: Utc::now(), raw: "1".into() }))
        }
    }

    struct DroppingChannel {
        opens: AtomicUsize,
    }

    #[async_trait]
    impl TriggerChannel for DroppingChannel {
        async fn open(&self) -> Result<Box<dyn TriggerSource>, TriggerError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(DroppingSource { served: false }))
        }

        fn describe(&self) -> String {
            "dropping".into()
        }
    }

    #[tokio::test]
    async fn reader_reopens_after_transport_error_mid_stream() {
        let channel = Arc::new(DroppingChannel { opens: AtomicUsize::new(0) });
        let (tx, mut rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader = tokio::spawn(run_trigger_reader(
            channel.clone(),
            tx,
            Duration::from_millis(5),
            shutdown_rx,
        ));

        for _ in 0..3 {
            let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("reader stopped forwarding after a transport error")
                .expect("channel closed");
            assert_eq!(ev.raw, "1");
        }
        assert!(channel.opens.load(Ordering::SeqCst) >= 3);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), reader)
            .await
            .expect("reader did not stop")
            .unwrap();
    }
}
