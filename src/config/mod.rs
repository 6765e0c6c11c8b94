//! Configuration snapshot, hot-reloadable via an atomic pointer swap, and
//! the toml/yaml loader that produces one.

mod types;

pub use types::{CpuConfig, FeatureGates, MemoryConfig, Settings};

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Hands out the current [`Settings`] snapshot; `reload` replaces it
/// atomically so concurrent readers never observe a torn config.
pub struct ConfigHandle {
    current: RwLock<Arc<Settings>>,
}

impl ConfigHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
        }
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        self.current.read().clone()
    }

    pub fn reload(&self, settings: Settings) {
        *self.current.write() = Arc::new(settings);
    }

    /// Loads from a `.toml` or `.yaml`/`.yml` file, validates it, and
    /// replaces the snapshot.
    pub fn reload_from_file(&self, path: &Path) -> Result<()> {
        self.reload(load_settings_file(path)?);
        Ok(())
    }
}

pub fn load_settings_file(path: &Path) -> Result<Settings> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Validation(format!("reading config {}: {e}", path.display())))?;

    let settings: Settings = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&contents).map_err(|e| Error::Validation(format!("parsing toml config: {e}")))?,
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&contents).map_err(|e| Error::Validation(format!("parsing yaml config: {e}")))?
        }
        other => {
            return Err(Error::Validation(format!(
                "unsupported config extension: {:?}",
                other
            )))
        }
    };

    settings.validate()?;
    Ok(settings)
}
