//! Server configuration, loaded from a TOML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub buffers: BufferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name the server identifies itself with in message prefixes.
    pub name: String,
    pub bind: String,
    pub port: u16,
    pub motd_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "irc.minircd.local".to_string(),
            bind: "0.0.0.0".to_string(),
            port: 6667,
            motd_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_clients: usize,
    pub max_channels: usize,
    pub max_channels_per_user: usize,
    /// Total membership + visibility links across the server.
    pub max_links: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_clients: 512,
            max_channels: 128,
            max_channels_per_user: 16,
            max_links: 8192,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Inbound buffer size per connection; also the longest accepted line.
    pub recvq: usize,
    pub sendq: usize,
    pub pool_prewarm: usize,
    pub pool_ceiling: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            recvq: 4096,
            sendq: 16384,
            pool_prewarm: 8,
            pool_ceiling: 64,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.name.is_empty() {
            return Err(Error::Config("server name must not be empty".to_string()));
        }
        if self.limits.max_clients == 0 {
            return Err(Error::Config("max_clients must be positive".to_string()));
        }
        if self.buffers.recvq < 64 || self.buffers.sendq < 64 {
            return Err(Error::Config(
                "recvq and sendq must be at least 64 bytes".to_string(),
            ));
        }
        if self.limits.max_links < self.limits.max_channels_per_user {
            return Err(Error::Config(
                "max_links must cover at least one user's channels".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 6667);
        assert_eq!(config.limits.max_clients, 512);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let mut config = Config::default();
        config.server.name = "irc.example.org".to_string();
        config.limits.max_channels = 7;
        let file = tempfile::NamedTempFile::new().unwrap();
        config.to_file(file.path()).unwrap();
        let loaded = Config::from_file(file.path()).unwrap();
        assert_eq!(loaded.server.name, "irc.example.org");
        assert_eq!(loaded.limits.max_channels, 7);
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nname = \"irc.partial.test\"").unwrap();
        let loaded = Config::from_file(file.path()).unwrap();
        assert_eq!(loaded.server.name, "irc.partial.test");
        assert_eq!(loaded.server.port, 6667);
        assert_eq!(loaded.buffers.recvq, 4096);
    }

    #[test]
    fn test_validate_rejects_tiny_buffers() {
        let mut config = Config::default();
        config.buffers.recvq = 8;
        assert!(config.validate().is_err());
    }
}
