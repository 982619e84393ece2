//! Router list loading.
//!
//! The router file is a JSON array of connection descriptors:
//! `[{"ip": "10.0.0.1", "user": "lab", "password": "secret"}]`.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::data_aquisition::netconf::NETCONF_PORT;

pub const DEFAULT_CONFIG_PATH: &str = "Json_files/default_network_config.json";

/// Connection details for one router. Read once from the config and consumed to open a session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterDescriptor {
    pub ip: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    NETCONF_PORT
}

impl RouterDescriptor {
    #[cfg(test)]
    pub fn new(ip: &str, user: &str, password: &str) -> Self {
        Self {
            ip: ip.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            port: NETCONF_PORT,
        }
    }
}

// Passwords stay out of logs
impl fmt::Debug for RouterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterDescriptor")
            .field("ip", &self.ip)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read router file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse router file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Load the router list. Any failure here is fatal to the run.
pub fn load_routers(path: &Path) -> Result<Vec<RouterDescriptor>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let routers: Vec<RouterDescriptor> =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(count = routers.len(), path = %path.display(), "parsed router file");
    Ok(routers)
}
