//! Daemon configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the tally daemon.
///
/// Can be loaded from a TOML file via [`DaemonConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). CLI flags override file values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Root directory of the object store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Port for the HTTP interface.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of geolocation partition files (optional; lookups degrade
    /// to the unknown classification without it).
    #[serde(default)]
    pub geoip_dir: Option<PathBuf>,

    /// CSV of provider CIDR ranges (`ip_prefix,provider,tag`), optional.
    #[serde(default)]
    pub provider_ranges: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            port: default_port(),
            geoip_dir: None,
            provider_ranges: None,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tally_data")
}

fn default_port() -> u16 {
    8077
}
