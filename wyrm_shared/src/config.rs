//! Configuration system.
//!
//! Loads server configuration from JSON strings/files (file IO left to the
//! binary). Fields the JSON omits fall back to defaults.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. `127.0.0.1:1337`.
    pub listen_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Bound on the per-tick accept wait. Keeps the tick loop from stalling
    /// on network I/O.
    #[serde(default = "default_accept_timeout_ms")]
    pub accept_timeout_ms: u64,
    /// Maximum simultaneous sessions, half-open included.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// How long a half-open session may sit silent before eviction.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Accounts checked by the password authenticator. Empty means the
    /// server runs open: any well-formed credential frame is accepted.
    #[serde(default)]
    pub accounts: HashMap<String, String>,
}

fn default_accept_timeout_ms() -> u64 {
    1
}

fn default_max_sessions() -> usize {
    16
}

fn default_handshake_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:1337".to_string(),
            tick_hz: 64,
            accept_timeout_ms: default_accept_timeout_ms(),
            max_sessions: default_max_sessions(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            accounts: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_fields_take_defaults() {
        let cfg =
            ServerConfig::from_json_str(r#"{"listen_addr": "0.0.0.0:1337", "tick_hz": 32}"#)
                .unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:1337");
        assert_eq!(cfg.tick_hz, 32);
        assert_eq!(cfg.max_sessions, 16);
        assert_eq!(cfg.handshake_timeout_secs, 10);
        assert!(cfg.accounts.is_empty());
    }

    #[test]
    fn accounts_parse() {
        let cfg = ServerConfig::from_json_str(
            r#"{"listen_addr": "127.0.0.1:0", "tick_hz": 64, "accounts": {"ormr": "fafnir"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.accounts.get("ormr").map(String::as_str), Some("fafnir"));
    }
}
