//! Aggregator-side connection intake: accept follower connections and pump
//! their records into the shared sink.

use crate::domain::{LogEvent, LogRecord};
use crate::wire::{self, WireError};
use std::io::ErrorKind;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run the accept loop until the token is cancelled. Each accepted
/// follower connection gets an independent reader task; a reader failure
/// tears down its own connection and nothing else.
pub async fn run_listener(
    listener: UnixListener,
    sink: mpsc::Sender<LogRecord>,
    events: broadcast::Sender<LogEvent>,
    token: CancellationToken,
) {
    let mut readers = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    debug!("accepted log relay connection");
                    readers.spawn(read_connection(
                        stream,
                        sink.clone(),
                        events.clone(),
                        token.clone(),
                    ));
                }
                Err(e) => warn!("failed to accept relay connection: {e}"),
            },
            () = token.cancelled() => break,
        }
    }
    // Stop accepting before draining readers, so connections in flight get
    // to finish their current record.
    drop(listener);
    while readers.join_next().await.is_some() {}
    info!("log channel listener stopped");
}

/// Pump records from one follower until end-of-stream, a decode error, or
/// shutdown. A malformed record is dropped and closes this connection
/// only.
async fn read_connection(
    mut stream: UnixStream,
    sink: mpsc::Sender<LogRecord>,
    events: broadcast::Sender<LogEvent>,
    token: CancellationToken,
) {
    loop {
        let record = tokio::select! {
            read = wire::read_record(&mut stream) => match read {
                Ok(record) => record,
                Err(WireError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    debug!("relay connection closed by peer");
                    return;
                }
                Err(e) => {
                    warn!("dropping malformed relay record, closing its connection: {e}");
                    return;
                }
            },
            () = token.cancelled() => return,
        };
        let _ = events.send(LogEvent {
            severity: record.severity,
            text: record.text.clone(),
        });
        // Awaiting keeps this follower's records ordered and lets a
        // stalled sink hold the reader back instead of buffering without
        // bound.
        if sink.send(record).await.is_err() {
            return;
        }
    }
}
