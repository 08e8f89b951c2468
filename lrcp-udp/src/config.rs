//! Server and session configuration.
//!
//! Values come from the command line (see `main.rs`); everything has a
//! default so tests can build a config with struct-update syntax.

use std::net::SocketAddr;

use crate::timer::TimerConfig;

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:9000";

/// Settings shared by every session a [`crate::registry::Registry`] creates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub timers: TimerConfig,
}

/// Top-level settings for [`crate::server::Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// UDP address to listen on.
    pub bind: SocketAddr,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 9000)),
            session: SessionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, DEFAULT_BIND.parse::<SocketAddr>().unwrap());
        assert_eq!(
            config.session.timers.retransmit_interval,
            Duration::from_secs(2)
        );
    }
}
