use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by a JSON file
///
/// Uses `ArcSwap` so readers never block.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    cache: Arc<ArcSwap<AppConfig>>,
}

impl ConfigStore {
    /// Load the file, or start from defaults when it does not exist
    pub async fn load(path: &Path) -> Result<Self> {
        let config = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let config: AppConfig = serde_json::from_slice(&bytes).map_err(|e| {
                    AppError::Config(format!("{}: {}", path.display(), e))
                })?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration at {}, using defaults", path.display());
                AppConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            cache: Arc::new(ArcSwap::from_pointee(config)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration (lock-free)
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Apply in-memory overrides without touching the file
    pub fn apply<F>(&self, f: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = (**self.cache.load()).clone();
        f(&mut config);
        self.cache.store(Arc::new(config));
    }

    /// Write the current configuration to disk
    pub async fn save(&self) -> Result<()> {
        let config = self.get();
        self.write(&config).await
    }

    async fn write(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(config)?;
        // Atomic replace
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
