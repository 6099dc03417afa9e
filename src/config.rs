use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::transform::CanvasGeometry;

pub const DEFAULT_PORT: u16 = 5000;

/// Persisted defaults for both callers. CLI flags override whatever is
/// loaded from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub geometry: CanvasGeometry,
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            geometry: CanvasGeometry::default(),
            input_dir: None,
            output_dir: None,
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("canvas-resizer").join("config.json"))
    }

    /// Load the saved config, falling back to defaults when the file is
    /// missing or unreadable. A broken file is logged, never fatal.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path).unwrap_or_default(),
            None => Self::default(),
        }
    }

    fn load_from(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
                Ok(config) => {
                    log::info!("loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("failed to parse config {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("failed to read config {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self) -> io::Result<()> {
        let Some(path) = Self::config_path() else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no config directory on this system",
            ));
        };
        self.save_to(&path)
    }

    fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }
}
