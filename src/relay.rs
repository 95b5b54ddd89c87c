//! Follower-side relay: one outbound connection to the aggregator.
//!
//! Delivery is best-effort. Records are dropped when the queue is full,
//! when a write fails or times out, and once the aggregator has gone away;
//! nothing is retried and nothing is surfaced to the emitting call site.

use crate::config::CoordinatorConfig;
use crate::domain::{LogRecord, Role};
use crate::wire;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle used by the dispatch path to forward records to the aggregator.
pub struct RelayClient {
    tx: mpsc::Sender<LogRecord>,
    connected: Arc<AtomicBool>,
    token: CancellationToken,
    tasks: Mutex<Option<[JoinHandle<()>; 2]>>,
}

impl RelayClient {
    /// Split the connection and spawn the writer task plus the disconnect
    /// watcher. `role` is flipped to [`Role::Unbound`] when the aggregator
    /// goes away.
    pub fn spawn(
        stream: UnixStream,
        config: &CoordinatorConfig,
        role: Arc<RwLock<Role>>,
        token: CancellationToken,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let connected = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(write_loop(
            write_half,
            rx,
            config.send_timeout,
            connected.clone(),
            token.clone(),
        ));
        let watcher = tokio::spawn(watch_disconnect(
            read_half,
            connected.clone(),
            role,
            token.clone(),
        ));

        Self {
            tx,
            connected,
            token,
            tasks: Mutex::new(Some([writer, watcher])),
        }
    }

    /// Queue one record for the aggregator. A no-op once the connection is
    /// gone; never blocks the caller.
    pub fn send(&self, record: LogRecord) {
        if !self.connected.load(Ordering::Acquire) {
            return;
        }
        if self.tx.try_send(record).is_err() {
            debug!("relay queue full or stopped, dropping record");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Stop forwarding and close the outbound connection. Idempotent.
    pub async fn shutdown(&self) {
        self.connected.store(false, Ordering::Release);
        self.token.cancel();
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            for task in tasks {
                let _ = task.await;
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<LogRecord>,
    send_timeout: Duration,
    connected: Arc<AtomicBool>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(record) => {
                    if !forward(&mut writer, &record, send_timeout, &connected).await {
                        break;
                    }
                }
                None => break,
            },
            () = token.cancelled() => {
                // Drain what was queued before the shutdown, then stop.
                while let Ok(record) = rx.try_recv() {
                    if !forward(&mut writer, &record, send_timeout, &connected).await {
                        break;
                    }
                }
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}

/// Write one record under the bounded wait. Returns `false` when the link
/// is done for; the record in hand is dropped, not retried.
async fn forward(
    writer: &mut OwnedWriteHalf,
    record: &LogRecord,
    send_timeout: Duration,
    connected: &AtomicBool,
) -> bool {
    match timeout(send_timeout, wire::write_record(writer, record)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("relay write failed, forwarding stops: {e}");
            connected.store(false, Ordering::Release);
            false
        }
        Err(_) => {
            // A stuck aggregator must not hang log emission.
            warn!("relay write timed out after {send_timeout:?}, forwarding stops");
            connected.store(false, Ordering::Release);
            false
        }
    }
}

/// The aggregator never sends application data, so any read completion
/// means the connection is gone.
async fn watch_disconnect(
    mut reader: OwnedReadHalf,
    connected: Arc<AtomicBool>,
    role: Arc<RwLock<Role>>,
    token: CancellationToken,
) {
    let mut buf = [0u8; 64];
    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) | Err(_) => {
                    info!("log aggregator went away, emission continues without forwarding");
                    connected.store(false, Ordering::Release);
                    *role.write() = Role::Unbound;
                    return;
                }
                Ok(_) => {}
            },
            () = token.cancelled() => return,
        }
    }
}
