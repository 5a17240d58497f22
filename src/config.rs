use std::time::Duration;

/// Front-end configuration parsed from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Search-process executable; without it no engine opponent is offered.
    pub engine_path: Option<String>,
    /// Think time per engine move in milliseconds.
    pub engine_movetime_ms: u64,
    /// How long to wait for any engine reply in milliseconds.
    pub engine_timeout_ms: u64,
    /// Peer session host to bind or connect to.
    pub peer_host: String,
    /// Peer session port.
    pub peer_port: u16,
    /// Name announced to peers and written to PGN headers.
    pub player_name: String,
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// missing or unparseable values.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = AppConfig::default();
        AppConfig {
            engine_path: lookup("CHESS_ENGINE_PATH").filter(|v| !v.trim().is_empty()),
            engine_movetime_ms: lookup("CHESS_ENGINE_MOVETIME")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.engine_movetime_ms),
            engine_timeout_ms: lookup("CHESS_ENGINE_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.engine_timeout_ms),
            peer_host: lookup("CHESS_PEER_HOST").unwrap_or(defaults.peer_host),
            peer_port: lookup("CHESS_PEER_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.peer_port),
            player_name: lookup("CHESS_PLAYER_NAME").unwrap_or(defaults.player_name),
        }
    }

    /// Socket address string for the peer session.
    pub fn peer_addr(&self) -> String {
        format!("{}:{}", self.peer_host, self.peer_port)
    }

    pub fn engine_movetime(&self) -> Duration {
        Duration::from_millis(self.engine_movetime_ms)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            engine_path: None,
            engine_movetime_ms: 1000,
            engine_timeout_ms: 10_000,
            peer_host: "127.0.0.1".to_string(),
            peer_port: 7878,
            player_name: "Player".to_string(),
        }
    }
}
