use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for coordinator setup and teardown.
///
/// Once a coordinator is running, nothing in the pipeline surfaces errors
/// to log call sites: emission is fire-and-forget and failures degrade to
/// dropped records.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel setup failed at {path}: {source}")]
    Channel {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Diagnostic hook registration failed: {0}")]
    Hook(String),
}
