//! Process-facing entry point wiring election, relay, sink and
//! notification together.
//!
//! A [`LogCoordinator`] is constructed once by the host application's
//! composition root (or through the process-wide [`acquire`] surface) and
//! handed to anything that logs. Every emission flows through
//! [`LogCoordinator::log`], which publishes a notification event and then
//! routes the record by role: the aggregator and unbound processes append
//! to their own file, followers relay to the aggregator.

use crate::config::CoordinatorConfig;
use crate::domain::{CoordinatorError, LogEvent, LogRecord, Role, Severity};
use crate::election::{self, ElectionOutcome};
use crate::hook::LogLayer;
use crate::relay::RelayClient;
use crate::server;
use crate::sink::{self, SinkHandle};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Capacity of the notification channel handed to subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Handle to the process's shared-log pipeline.
///
/// Clones share one pipeline. The role is decided once when the pipeline
/// starts; log emission from any thread is fire-and-forget and never
/// reports delivery.
#[derive(Clone)]
pub struct LogCoordinator {
    shared: Arc<Shared>,
}

struct Shared {
    config: CoordinatorConfig,
    role: Arc<RwLock<Role>>,
    events: broadcast::Sender<LogEvent>,
    sink: SinkHandle,
    relay: Option<RelayClient>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
    /// Cancels the listener, per-connection readers and the relay.
    intake_token: CancellationToken,
    /// Cancelled only after intake is gone, so the sink drains everything
    /// that was still queued.
    sink_token: CancellationToken,
    released: AtomicBool,
}

impl LogCoordinator {
    /// Validate the configuration, run the election and spawn the
    /// role-appropriate tasks.
    pub async fn start(config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let role = Arc::new(RwLock::new(Role::Unbound));
        let intake_token = CancellationToken::new();
        let sink_token = CancellationToken::new();

        let (sink, relay, listener_task) = match election::elect(&config).await {
            ElectionOutcome::Leader(listener) => {
                *role.write() = Role::Leader;
                let file = sink::open_log_file(&config.log_file_path()).await;
                let sink = SinkHandle::spawn(file, config.queue_capacity, sink_token.clone());
                let task = tokio::spawn(server::run_listener(
                    listener,
                    sink.sender(),
                    events.clone(),
                    intake_token.clone(),
                ));
                (sink, None, Some(task))
            }
            ElectionOutcome::Follower(stream) => {
                *role.write() = Role::Follower;
                // Followers persist nothing locally; after a disconnect
                // their records are dropped, not written to a late-opened
                // private file.
                let sink = SinkHandle::spawn(None, config.queue_capacity, sink_token.clone());
                let relay =
                    RelayClient::spawn(stream, &config, role.clone(), intake_token.clone());
                (sink, Some(relay), None)
            }
            ElectionOutcome::Unbound => {
                let file = sink::open_log_file(&config.log_file_path()).await;
                let sink = SinkHandle::spawn(file, config.queue_capacity, sink_token.clone());
                (sink, None, None)
            }
        };

        let coordinator = Self {
            shared: Arc::new(Shared {
                config,
                role,
                events,
                sink,
                relay,
                listener_task: Mutex::new(listener_task),
                intake_token,
                sink_token,
                released: AtomicBool::new(false),
            }),
        };

        let announcement = match coordinator.role() {
            Role::Leader => format!(
                "created log aggregator, instance name: {}",
                coordinator.shared.config.instance_name
            ),
            Role::Follower => format!(
                "new log relay client, instance name: {}",
                coordinator.shared.config.instance_name
            ),
            Role::Unbound => format!(
                "log aggregation unavailable, instance name: {}, logging locally",
                coordinator.shared.config.instance_name
            ),
        };
        info!("{announcement}");
        coordinator.log(Severity::Debug, &announcement);

        Ok(coordinator)
    }

    /// The single dispatch point for every log emission in the process.
    ///
    /// Always publishes a [`LogEvent`] for in-process subscribers, then
    /// routes by role. Fire-and-forget: there is no delivery result and
    /// the call never blocks beyond queueing.
    pub fn log(&self, severity: Severity, text: &str) {
        if self.shared.released.load(Ordering::Acquire) {
            return;
        }
        self.shared.dispatch(severity, text);
    }

    /// Subscribe to the notification stream carrying every dispatched
    /// record (a UI log viewer, for example). Delivery is independent of
    /// persistence and relay.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.shared.events.subscribe()
    }

    pub fn role(&self) -> Role {
        *self.shared.role.read()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    /// Where this process would write records it persists itself. Only the
    /// aggregator and unbound processes actually own the file.
    pub fn log_file_path(&self) -> PathBuf {
        self.shared.config.log_file_path()
    }

    /// A `tracing` layer routing every event in the process through this
    /// pipeline; register it once from the composition root.
    pub fn layer(&self) -> LogLayer {
        LogLayer::new(self.clone())
    }

    /// Two handles to the same underlying pipeline?
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Tear the pipeline down: stop accepting connections, let in-flight
    /// writes complete, flush and close the file, and release the channel
    /// binding or the outbound connection. Idempotent; later [`log`]
    /// calls on any clone are no-ops.
    ///
    /// [`log`]: LogCoordinator::log
    pub async fn release(&self) {
        if self.shared.released.swap(true, Ordering::SeqCst) {
            return;
        }

        let role = self.role();
        let announcement = match role {
            Role::Leader => format!(
                "shutdown log aggregator, instance name: {}",
                self.shared.config.instance_name
            ),
            Role::Follower => format!(
                "shutdown log relay client, instance name: {}",
                self.shared.config.instance_name
            ),
            Role::Unbound => format!(
                "shutdown local logging, instance name: {}",
                self.shared.config.instance_name
            ),
        };
        // Dispatch directly: the released flag is already set, but this
        // last record still goes through the pipeline.
        self.shared.dispatch(Severity::Debug, &announcement);

        // Intake first: no new connections, readers and relay finish their
        // current record.
        self.shared.intake_token.cancel();
        let listener_task = self.shared.listener_task.lock().take();
        if let Some(task) = listener_task {
            let _ = task.await;
        }
        if let Some(relay) = &self.shared.relay {
            relay.shutdown().await;
        }

        // Then the sink: drain what was queued, flush, sync, close.
        self.shared.sink_token.cancel();
        self.shared.sink.shutdown().await;

        if role == Role::Leader {
            let _ = std::fs::remove_file(self.shared.config.socket_path());
        }
        info!("{announcement}");
    }
}

impl Shared {
    fn dispatch(&self, severity: Severity, text: &str) {
        let _ = self.events.send(LogEvent {
            severity,
            text: text.to_string(),
        });
        let record = LogRecord::new(severity, text);
        let role = *self.role.read();
        match role {
            Role::Follower => {
                if let Some(relay) = &self.relay {
                    relay.send(record);
                }
            }
            Role::Leader | Role::Unbound => self.sink.submit(record),
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Best-effort teardown for handles dropped without release(): stop
        // the tasks and unlink the channel binding so the next election
        // does not need stale-socket recovery.
        self.intake_token.cancel();
        self.sink_token.cancel();
        if *self.role.read() == Role::Leader && !self.released.load(Ordering::Acquire) {
            let _ = std::fs::remove_file(self.config.socket_path());
        }
    }
}

static ACTIVE: tokio::sync::Mutex<Option<LogCoordinator>> = tokio::sync::Mutex::const_new(None);

/// Process-wide idempotent acquisition.
///
/// Thread-safe; the first caller runs the election and fixes the role for
/// the process lifetime. Later callers get a handle to the same pipeline,
/// whatever name they pass, without a second listener or file handle
/// being created.
pub async fn acquire(instance_name: &str) -> Result<LogCoordinator, CoordinatorError> {
    let mut active = ACTIVE.lock().await;
    if let Some(existing) = active.as_ref() {
        return Ok(existing.clone());
    }
    let coordinator = LogCoordinator::start(CoordinatorConfig::new(instance_name)).await?;
    *active = Some(coordinator.clone());
    Ok(coordinator)
}

/// Release the process-wide handle obtained from [`acquire`]. Idempotent:
/// releasing an already-released handle is a no-op, and a later
/// [`acquire`] starts a fresh pipeline.
pub async fn release(handle: &LogCoordinator) {
    {
        let mut active = ACTIVE.lock().await;
        if active
            .as_ref()
            .is_some_and(|current| current.same_instance(handle))
        {
            *active = None;
        }
    }
    handle.release().await;
}
