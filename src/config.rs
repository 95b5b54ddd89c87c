use crate::domain::CoordinatorError;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for one [`LogCoordinator`](crate::LogCoordinator).
///
/// `instance_name` identifies the application family: every process started
/// with the same name shares one channel and, through it, one log file.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Application family name. Immutable for the process lifetime.
    pub instance_name: String,
    /// Directory holding the channel socket.
    pub runtime_dir: PathBuf,
    /// Directory under which `datalog/` and the log file live.
    pub data_dir: PathBuf,
    /// How long the startup probe waits for an existing aggregator.
    pub probe_timeout: Duration,
    /// Bounded wait for one relayed record to be written out.
    pub send_timeout: Duration,
    /// Capacity of the relay and sink queues.
    pub queue_capacity: usize,
}

impl CoordinatorConfig {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            runtime_dir: default_runtime_dir(),
            data_dir: default_data_dir(),
            probe_timeout: Duration::from_millis(500),
            send_timeout: Duration::from_millis(100),
            queue_capacity: 1024,
        }
    }

    /// Channel name shared by every process of the instance.
    pub fn channel_name(&self) -> String {
        format!("{}_log", self.instance_name)
    }

    /// Socket path the aggregator binds and followers connect to.
    pub fn socket_path(&self) -> PathBuf {
        self.runtime_dir.join(self.channel_name())
    }

    /// Log file owned by the aggregator (or by an unbound process).
    pub fn log_file_path(&self) -> PathBuf {
        self.data_dir
            .join("datalog")
            .join(format!("{}.txt", self.channel_name()))
    }

    /// Validates the settings and returns an error if invalid.
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        validate_instance_name(&self.instance_name)?;
        if self.probe_timeout.is_zero() {
            return Err(CoordinatorError::Config(
                "Probe timeout cannot be zero".into(),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(CoordinatorError::Config(
                "Send timeout cannot be zero".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(CoordinatorError::Config(
                "Queue capacity cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

/// The instance name becomes part of a socket path and a file name, so it
/// must be a single non-empty path component.
fn validate_instance_name(name: &str) -> Result<(), CoordinatorError> {
    if name.trim().is_empty() {
        return Err(CoordinatorError::Config(
            "Instance name cannot be empty".into(),
        ));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(CoordinatorError::Config(format!(
            "Instance name cannot contain path separators: {name:?}"
        )));
    }
    Ok(())
}

fn default_runtime_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

fn default_data_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
