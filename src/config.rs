//! Configuration file handling

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use stu540::consts::DEFAULT_TIMEOUT;
use stu540::types::Rgb;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub pen: PenConfig,
    pub display: DisplayConfig,
}

impl Config {
    /// Get the config file path for this platform
    pub fn path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "stu-sync").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load config from file, or create default if it doesn't exist
    pub fn load_or_create() -> Result<Self, Box<dyn Error>> {
        let path = Self::path().ok_or("could not determine config directory")?;

        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let config = Config::default();
            config.save_with_header(&path)?;
            info!("created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Save config with header comments for new files
    fn save_with_header(&self, path: &PathBuf) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let header = "# stu-sync configuration file\n\n";
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, format!("{header}{contents}"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Upper bound on each request to the tablet
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PenConfig {
    /// Ink color (hex)
    pub color: String,
    /// Stroke width
    pub width: u8,
}

impl PenConfig {
    pub fn color(&self) -> Result<Rgb, stu540::types::Stu540Error> {
        self.color.parse()
    }
}

impl Default for PenConfig {
    fn default() -> Self {
        Self {
            color: "#000000".into(),
            width: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Screen background, also used behind transparent images (hex)
    pub background_color: String,
    /// Use nearest neighbor interpolation when resizing images
    pub use_nearest_neighbor: bool,
}

impl DisplayConfig {
    pub fn background_color(&self) -> Result<Rgb, stu540::types::Stu540Error> {
        self.background_color.parse()
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            background_color: "#FFFFFF".into(),
            use_nearest_neighbor: false,
        }
    }
}
