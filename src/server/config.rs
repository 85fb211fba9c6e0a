//! Server configuration.

use std::time::Duration;

/// Tunables for the chat server. `Default` mirrors the values the server
/// has always shipped with; the binary overrides host/port from CLI flags.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to bind to (0 = pick a free port, used by tests)
    pub port: u16,
    /// Maximum simultaneous connections per source IP
    pub max_connections_per_ip: usize,
    /// Messages allowed per rate-limit window
    pub rate_limit_budget: u32,
    /// Length of the rate-limit window
    pub rate_limit_window: Duration,
    /// Maximum accepted input line length in characters
    pub max_line_length: usize,
    /// Capacity of the broadcast queue; producers block when it is full
    pub broadcast_queue_capacity: usize,
    /// Per-client delivery queue length; a peer that lets it fill up is
    /// treated as dead and evicted
    pub client_outbox_capacity: usize,
    /// Entries kept in each lobby's recent-message ring buffer
    pub recent_buffer_capacity: usize,
    /// Age cutoff for history replayed on first connect
    pub connect_replay_window: Duration,
    /// Age cutoff for history replayed on `/join`
    pub join_replay_window: Duration,
    /// Interval between idle-context sweeps
    pub sweep_interval: Duration,
    /// A lobby's context is discarded once its newest entry is older than this
    pub context_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_connections_per_ip: 10,
            rate_limit_budget: 5,
            rate_limit_window: Duration::from_secs(10),
            max_line_length: 1000,
            broadcast_queue_capacity: 100,
            client_outbox_capacity: 256,
            recent_buffer_capacity: 5,
            connect_replay_window: Duration::from_secs(5 * 60),
            join_replay_window: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(30 * 60),
            context_idle_timeout: Duration::from_secs(2 * 60 * 60),
        }
    }
}
