//! Configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::epg::DEFAULT_MAX_SOURCES;
use crate::storage::DEFAULT_CHUNK_SIZE;

const APP_DIR: &str = "iptv_guide";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Checkout of the external guide grabber (contains `sites/`)
    #[serde(default)]
    pub epg_repo: Option<PathBuf>,
    #[serde(default)]
    pub epg_url: String,
    /// Guide source budget; 0 or less tries every covering source
    #[serde(default = "default_max_sources")]
    pub max_sources: i32,
    #[serde(default = "default_grab_days")]
    pub grab_days: u32,
    #[serde(default = "default_grab_timeout")]
    pub grab_timeout_secs: u64,
    #[serde(default = "default_grab_concurrency")]
    pub grab_concurrency: usize,
    #[serde(default = "default_chunk_size")]
    pub epg_chunk_size: usize,
}

fn default_db_path() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("data"));
    path.push(APP_DIR);
    path.push("iptv.db");
    path
}
fn default_max_sources() -> i32 { DEFAULT_MAX_SOURCES }
fn default_grab_days() -> u32 { 1 }
fn default_grab_timeout() -> u64 { 900 }
fn default_grab_concurrency() -> usize { 2 }
fn default_chunk_size() -> usize { DEFAULT_CHUNK_SIZE }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            epg_repo: None,
            epg_url: String::new(),
            max_sources: DEFAULT_MAX_SOURCES,
            grab_days: 1,
            grab_timeout_secs: 900,
            grab_concurrency: 2,
            epg_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        fs::create_dir_all(&path).ok();
        path.push("config.json");
        path
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults")
                    }
                }
            }
        }

        Self::default()
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> std::io::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
    }
}
