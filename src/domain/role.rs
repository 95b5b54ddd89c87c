use serde::{Deserialize, Serialize};

/// Where this process sits in the shared-log topology.
///
/// Decided once at startup. The only later transition is
/// `Follower -> Unbound`, when the aggregator this process was relaying to
/// goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Owns the channel and the shared log file; accepts relay connections.
    Leader,
    /// Relays every record to the aggregator instead of writing locally.
    Follower,
    /// No aggregation: records go to this process's own file, or are
    /// dropped if none could be opened.
    Unbound,
}
