use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const DB_FILE: &str = "sitewatcher.db";
const SESSION_SECRET_FILE: &str = ".session_secret";

/// Server runtime configuration, assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Base URL of the discovery worker service.
    pub worker_base_url: String,
    /// Public base URL used when building magic links and invite links.
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            worker_base_url: "http://127.0.0.1:8090".to_string(),
            public_base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid host/port: {e}")))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn session_secret_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_SECRET_FILE)
    }
}

pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE)
}

pub fn session_secret_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_SECRET_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 8080);

        let bad = ServerConfig {
            host: "not a host".to_string(),
            ..ServerConfig::default()
        };
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn test_paths_live_under_data_dir() {
        let config = ServerConfig {
            data_dir: PathBuf::from("/var/lib/sitewatcher"),
            ..ServerConfig::default()
        };
        assert_eq!(
            config.db_path(),
            PathBuf::from("/var/lib/sitewatcher/sitewatcher.db")
        );
        assert_eq!(
            config.session_secret_path(),
            PathBuf::from("/var/lib/sitewatcher/.session_secret")
        );
    }
}
