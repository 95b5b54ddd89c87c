//! Single-writer append sink for the shared log file.
//!
//! All producers (the local dispatch path and every per-connection reader)
//! funnel through one bounded channel into a background task that owns the
//! file handle, so concurrent records can never interleave mid-line.

use crate::domain::LogRecord;
use chrono::Local;
use parking_lot::Mutex;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to the background writer task.
pub struct SinkHandle {
    tx: mpsc::Sender<LogRecord>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SinkHandle {
    /// Spawn the writer task. `file` is `None` when the process has nothing
    /// to persist locally (relay-only follower, or the file failed to
    /// open); records are then accepted and dropped.
    pub fn spawn(file: Option<File>, capacity: usize, token: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(write_loop(file, rx, token));
        Self {
            tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue one record for appending. Fire-and-forget: a full queue or a
    /// stopped writer drops the record.
    pub fn submit(&self, record: LogRecord) {
        if self.tx.try_send(record).is_err() {
            debug!("log sink queue full or stopped, dropping record");
        }
    }

    /// Sender end for tasks that must preserve per-producer ordering and
    /// may await queue space (per-connection readers).
    pub fn sender(&self) -> mpsc::Sender<LogRecord> {
        self.tx.clone()
    }

    /// Wait for the writer to drain, flush and close the file. The caller
    /// cancels the sink token first; a second call is a no-op.
    pub async fn shutdown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("log sink task failed: {e}");
            }
        }
    }
}

/// Open the append-mode log file, creating its `datalog/` directory when
/// absent. Open failure is not fatal: the caller gets `None` and every
/// subsequent write is silently dropped, since logging must never take the
/// host application down.
pub async fn open_log_file(path: &Path) -> Option<File> {
    if let Some(dir) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("failed to create log directory {}: {e}", dir.display());
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(path).await {
        Ok(file) => Some(file),
        Err(e) => {
            warn!("failed to open log file {}: {e}", path.display());
            None
        }
    }
}

/// Render one file line: `HH:MM:SS| <label>| <text>`.
fn format_line(record: &LogRecord) -> String {
    format!(
        "{}| {}| {}\n",
        Local::now().format("%H:%M:%S"),
        record.severity.label(),
        record.text
    )
}

async fn write_loop(
    mut file: Option<File>,
    mut rx: mpsc::Receiver<LogRecord>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(record) => append(&mut file, &record).await,
                None => break,
            },
            () = token.cancelled() => {
                // Drain whatever was queued before the shutdown, then stop.
                while let Ok(record) = rx.try_recv() {
                    append(&mut file, &record).await;
                }
                break;
            }
        }
    }
    if let Some(file) = file.as_mut() {
        let _ = file.flush().await;
        let _ = file.sync_data().await;
    }
}

async fn append(file: &mut Option<File>, record: &LogRecord) {
    let Some(file) = file.as_mut() else { return };
    let line = format_line(record);
    // One write per line keeps concurrent records from splicing.
    if let Err(e) = file.write_all(line.as_bytes()).await {
        warn!("failed to append to log file: {e}");
        return;
    }
    if let Err(e) = file.flush().await {
        warn!("failed to flush log file: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use tempfile::TempDir;

    #[test]
    fn line_format_carries_timestamp_label_and_text() {
        let line = format_line(&LogRecord::new(Severity::Critical, "disk full"));
        // HH:MM:SS prefix, then the label and text.
        assert_eq!(&line[2..3], ":");
        assert_eq!(&line[5..6], ":");
        assert!(line.ends_with("| Critical| disk full\n"));
    }

    #[tokio::test]
    async fn records_are_appended_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("datalog").join("test_log.txt");
        let token = CancellationToken::new();

        let file = open_log_file(&path).await;
        assert!(file.is_some());
        let sink = SinkHandle::spawn(file, 16, token.clone());

        sink.submit(LogRecord::new(Severity::Debug, "first"));
        sink.submit(LogRecord::new(Severity::Warning, "second"));

        token.cancel();
        sink.shutdown().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("| Debug| first"));
        assert!(lines[1].ends_with("| Warning| second"));
    }

    #[tokio::test]
    async fn sink_without_file_drops_silently() {
        let token = CancellationToken::new();
        let sink = SinkHandle::spawn(None, 16, token.clone());

        sink.submit(LogRecord::new(Severity::Debug, "nowhere to go"));

        token.cancel();
        sink.shutdown().await;
        // A second shutdown is a no-op.
        sink.shutdown().await;
    }

    #[tokio::test]
    async fn open_failure_degrades_to_none() {
        let temp_dir = TempDir::new().unwrap();
        // The parent of the log path is a regular file, so neither the
        // directory nor the log file can be created.
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let path = blocker.join("datalog").join("test_log.txt");

        assert!(open_log_file(&path).await.is_none());
    }
}
