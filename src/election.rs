//! Startup role election over the instance's channel socket.
//!
//! The first process to bind the socket becomes the aggregator; a process
//! that finds a live socket becomes a follower and keeps the probe
//! connection as its relay transport. Everything else degrades to unbound
//! local-only logging: aggregation is auxiliary diagnostics and its loss
//! is never fatal to the host.

use crate::config::CoordinatorConfig;
use std::io::ErrorKind;
use std::path::Path;
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Result of the startup election.
pub enum ElectionOutcome {
    /// This process owns the channel and the shared log file.
    Leader(UnixListener),
    /// An aggregator is already running; the stream is the relay transport.
    Follower(UnixStream),
    /// No aggregator reachable and the channel could not be bound.
    Unbound,
}

/// Decide this process's role by probing for an existing aggregator and,
/// failing that, trying to become one.
pub async fn elect(config: &CoordinatorConfig) -> ElectionOutcome {
    let path = config.socket_path();
    if let Some(stream) = probe(&path, config).await {
        info!(
            instance = %config.instance_name,
            "joining existing log aggregator"
        );
        return ElectionOutcome::Follower(stream);
    }
    bind_listener(&path)
}

/// Bounded-wait connect to a possibly existing aggregator.
async fn probe(path: &Path, config: &CoordinatorConfig) -> Option<UnixStream> {
    match timeout(config.probe_timeout, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => Some(stream),
        Ok(Err(e)) => {
            debug!("no aggregator reachable at {}: {e}", path.display());
            None
        }
        Err(_) => {
            debug!(
                "aggregator probe timed out after {:?}",
                config.probe_timeout
            );
            None
        }
    }
}

fn bind_listener(path: &Path) -> ElectionOutcome {
    match UnixListener::bind(path) {
        Ok(listener) => {
            info!("bound log channel at {}", path.display());
            ElectionOutcome::Leader(listener)
        }
        Err(e) if e.kind() == ErrorKind::AddrInUse => recover_binding(path),
        Err(e) => {
            warn!(
                "cannot bind log channel at {}, continuing unbound: {e}",
                path.display()
            );
            ElectionOutcome::Unbound
        }
    }
}

/// The socket path is occupied even though the probe failed. A crashed
/// aggregator leaves its socket file behind; a connect attempt tells that
/// residue apart from a live owner that won a simultaneous bind race. The
/// race loser stays unbound; it does not go back to probing.
fn recover_binding(path: &Path) -> ElectionOutcome {
    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        warn!(
            "lost aggregator election for {}, continuing unbound",
            path.display()
        );
        return ElectionOutcome::Unbound;
    }
    debug!("removing stale log channel socket {}", path.display());
    if let Err(e) = std::fs::remove_file(path) {
        warn!(
            "cannot remove stale socket {}, continuing unbound: {e}",
            path.display()
        );
        return ElectionOutcome::Unbound;
    }
    match UnixListener::bind(path) {
        Ok(listener) => {
            info!(
                "reclaimed stale log channel at {}",
                path.display()
            );
            ElectionOutcome::Leader(listener)
        }
        Err(e) => {
            warn!(
                "rebind after stale cleanup failed for {}, continuing unbound: {e}",
                path.display()
            );
            ElectionOutcome::Unbound
        }
    }
}
