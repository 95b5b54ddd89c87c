//! Process-wide diagnostic capture.
//!
//! The host application registers [`LogLayer`] exactly once at startup to
//! route every `tracing` event in the process (framework and library
//! warnings included, not just explicit log calls) through the shared-log
//! pipeline. Registration is always an explicit call; nothing is installed
//! behind the host's back, and after
//! [`release`](crate::LogCoordinator::release) the layer is inert.

use crate::coordinator::LogCoordinator;
use crate::domain::{CoordinatorError, Severity};
use std::fmt::Write as _;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

/// A `tracing` layer feeding events into a [`LogCoordinator`].
///
/// Built with [`LogCoordinator::layer`]; compose it into the subscriber
/// stack at the composition root:
///
/// ```ignore
/// tracing_subscriber::registry()
///     .with(coordinator.layer())
///     .init();
/// ```
pub struct LogLayer {
    coordinator: LogCoordinator,
}

impl LogLayer {
    pub(crate) fn new(coordinator: LogCoordinator) -> Self {
        Self { coordinator }
    }
}

impl<S: Subscriber> Layer<S> for LogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // The pipeline's own diagnostics must not feed back into it.
        if event
            .metadata()
            .target()
            .starts_with(env!("CARGO_PKG_NAME"))
        {
            return;
        }
        let severity = severity_for(event.metadata().level());
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.coordinator.log(severity, &visitor.message);
    }
}

/// Map framework levels onto record severities; anything without a direct
/// counterpart is treated as Debug.
fn severity_for(level: &Level) -> Severity {
    match *level {
        Level::ERROR => Severity::Critical,
        Level::WARN => Severity::Warning,
        _ => Severity::Debug,
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        }
    }
}

/// Register the layer as the process's global default subscriber.
///
/// One explicit call from the composition root; fails if a global
/// subscriber is already set.
pub fn install_global(coordinator: &LogCoordinator) -> Result<(), CoordinatorError> {
    tracing_subscriber::registry()
        .with(coordinator.layer())
        .try_init()
        .map_err(|e| CoordinatorError::Hook(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::new("hooked");
        config.runtime_dir = dir.path().to_path_buf();
        config.data_dir = dir.path().to_path_buf();
        config.probe_timeout = Duration::from_millis(200);
        config
    }

    #[test]
    fn levels_map_with_debug_as_default() {
        assert_eq!(severity_for(&Level::ERROR), Severity::Critical);
        assert_eq!(severity_for(&Level::WARN), Severity::Warning);
        assert_eq!(severity_for(&Level::INFO), Severity::Debug);
        assert_eq!(severity_for(&Level::DEBUG), Severity::Debug);
        assert_eq!(severity_for(&Level::TRACE), Severity::Debug);
    }

    #[tokio::test]
    async fn tracing_events_flow_through_the_pipeline() {
        let dir = TempDir::new().unwrap();
        let coordinator = LogCoordinator::start(test_config(&dir)).await.unwrap();
        let mut events = coordinator.subscribe();

        let subscriber = tracing_subscriber::registry().with(coordinator.layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("framework warning: {}", 42);
        });

        let event = events.try_recv().unwrap();
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.text, "framework warning: 42");

        coordinator.release().await;
    }

    #[tokio::test]
    async fn own_diagnostics_do_not_feed_back() {
        let dir = TempDir::new().unwrap();
        let coordinator = LogCoordinator::start(test_config(&dir)).await.unwrap();
        let mut events = coordinator.subscribe();

        let subscriber = tracing_subscriber::registry().with(coordinator.layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "samlog::sink", "internal diagnostics");
        });

        assert!(events.try_recv().is_err());

        coordinator.release().await;
    }
}
