use std::error::Error;
use std::path::Path;

use serde::Deserialize;
use sensorbridge_lib::SerialSettings;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub serial: SerialSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8080
}

/// Load configuration from a YAML file.
pub fn load(path: &Path) -> Result<Config, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
    Ok(serde_yaml::from_str(&raw)?)
}
