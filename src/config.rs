//! Server-level configuration: bind address, port, log verbosity.
//!
//! Script loading, CLI parsing, and headless configuration stay with the host —
//! this only covers the wire-level knobs the engine itself owns.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the DAP TCP server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DapServerConfig {
    /// Address the listener binds to.
    pub bind_address: String,
    /// Port the listener binds to.
    pub port: u16,
    /// `tracing-subscriber` `EnvFilter` directive, e.g. `"info"` or `"vnscript_dap=debug"`.
    pub log_level: String,
}

impl Default for DapServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5678,
            log_level: "info".to_string(),
        }
    }
}

impl DapServerConfig {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// field the file omits. Returns the default configuration if `path` does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }

    /// Apply `VNDAP_BIND`, `VNDAP_PORT`, `VNDAP_LOG` environment overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(bind) = std::env::var("VNDAP_BIND") {
            self.bind_address = bind;
        }
        if let Ok(port) = std::env::var("VNDAP_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(log) = std::env::var("VNDAP_LOG") {
            self.log_level = log;
        }
        self
    }

    /// The socket address the server should bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `bind_address`/`port` do not form a valid socket address.
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        use anyhow::Context;
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .context("invalid bind address")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_localhost_on_documented_port() {
        let config = DapServerConfig::default();
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 5678);
    }

    #[test]
    fn missing_file_yields_default() {
        let config = DapServerConfig::load(Path::new("/nonexistent/vnscript-dap.toml")).unwrap();
        assert_eq!(config.port, 5678);
    }

    #[test]
    fn parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 9000\n").unwrap();
        let config = DapServerConfig::load(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_address, "127.0.0.1");
    }
}
