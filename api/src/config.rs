use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_EQUIPMENT_FILE: &str = "Data/equipment.json";
pub const DEFAULT_SERVICE_REQUESTS_FILE: &str = "Data/serviceRequests.json";

const PORT_VAR: &str = "PORT";
const EQUIPMENT_FILE_VAR: &str = "STORAGE_EQUIPMENT_FILE";
const SERVICE_REQUESTS_FILE_VAR: &str = "STORAGE_SERVICE_REQUESTS_FILE";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} is set but empty")]
    EmptyPath(&'static str),
}

/// Startup settings, read once from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub equipment_file: PathBuf,
    pub service_requests_file: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup(PORT_VAR) {
            Some(port_str) => match u16::from_str(port_str.trim()) {
                Ok(port_num) => {
                    info!("Using port {} from environment variable PORT.", port_num);
                    port_num
                }
                Err(_) => {
                    warn!(
                        "Invalid PORT value '{}' in environment variable. Using default port {}.",
                        port_str, DEFAULT_PORT
                    );
                    DEFAULT_PORT
                }
            },
            None => {
                info!(
                    "PORT environment variable not set. Using default port {}.",
                    DEFAULT_PORT
                );
                DEFAULT_PORT
            }
        };

        Ok(Self {
            port,
            equipment_file: storage_path(&lookup, EQUIPMENT_FILE_VAR, DEFAULT_EQUIPMENT_FILE)?,
            service_requests_file: storage_path(
                &lookup,
                SERVICE_REQUESTS_FILE_VAR,
                DEFAULT_SERVICE_REQUESTS_FILE,
            )?,
        })
    }
}

fn storage_path(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<PathBuf, ConfigError> {
    match lookup(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyPath(key)),
        Some(value) => Ok(PathBuf::from(value)),
        None => Ok(PathBuf::from(default)),
    }
}
