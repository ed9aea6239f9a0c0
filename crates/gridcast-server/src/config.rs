//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the gridcast server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server-initiated Ping frames, in seconds.
    pub ping_interval_secs: u64,
    /// Close the connection after this long without a Pong, in seconds.
    pub pong_timeout_secs: u64,
    /// Rolling rate-limit window, in seconds.
    pub rate_limit_window_secs: u64,
    /// Requests allowed per identity per window.
    pub rate_limit_max_requests: usize,
    /// Interval between rate-limiter idle-bucket sweeps, in seconds.
    pub limiter_sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 500,
            ping_interval_secs: 30,
            pong_timeout_secs: 60,
            rate_limit_window_secs: 60,
            rate_limit_max_requests: 60,
            limiter_sweep_interval_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_with_auto_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_rate_limit_is_sixty_per_minute() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.rate_limit_window_secs, 60);
        assert_eq!(cfg.rate_limit_max_requests, 60);
    }

    #[test]
    fn default_heartbeat_timings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ping_interval_secs, 30);
        assert_eq!(cfg.pong_timeout_secs, 60);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8080,
            max_connections: 10,
            ..ServerConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.port, cfg.port);
        assert_eq!(back.max_connections, cfg.max_connections);
    }

    #[test]
    fn deserialize_from_json_string() {
        let json = r#"{"host":"10.0.0.1","port":3000,"max_connections":5,
            "ping_interval_secs":10,"pong_timeout_secs":30,
            "rate_limit_window_secs":15,"rate_limit_max_requests":3,
            "limiter_sweep_interval_secs":60}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.rate_limit_max_requests, 3);
    }
}
