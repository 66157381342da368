use std::path::{Path, PathBuf};
use std::{fs, sync::Once};

use anyhow::{Context, Result};

/// Where the decoder gets its input from
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DecodeMode {
    /// Read the file in chunks and decode from memory, when the decoder can
    #[default]
    Memory,
    /// Skip the read stage and let the decoder open the file
    Path,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub decode_mode: DecodeMode,
    /// Size of the global worker pool, defaults to the number of logical CPUs
    pub worker_threads: Option<usize>,
}

static POOL: Once = Once::new();

impl LoaderConfig {
    pub fn load() -> Option<Self> {
        let config_path = Self::config_path()?;

        fs::read_to_string(&config_path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
    }

    /// Write to `~/.config/imgload/config.json`, returning where it went
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path().context("No home directory to save the config in")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    #[allow(deprecated)]
    fn config_path() -> Option<PathBuf> {
        let home = std::env::home_dir()?;
        Some(home.join(".config").join("imgload").join("config.json"))
    }

    /// Size the global rayon pool. Only the first configured loader gets a say.
    pub(crate) fn configure_pool(&self) {
        let Some(threads) = self.worker_threads else {
            return;
        };

        let mut applied = false;
        POOL.call_once(|| {
            applied = true;
            if let Err(e) = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
            {
                log::warn!("worker pool already running, ignoring worker_threads = {threads}: {e}");
            }
        });

        if !applied {
            log::debug!("worker pool already configured, ignoring worker_threads = {threads}");
        }
    }
}
