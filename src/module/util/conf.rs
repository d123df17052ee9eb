//! Config Handler.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::device::camera::Facing;

/// Errors raised while reading or writing the config file.
#[derive(Debug, Error)]
pub enum ConfError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] ::toml::de::Error),
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] ::toml::ser::Error),
}

/// Provides TOML config file handling.
pub mod toml {

    use super::{ConfError, DEFAULT_CONFIG};
    use crate::module::define;
    use std::fs::File;
    use std::io::prelude::*;
    use std::path::Path;

    /// Loads a configuration file from the given directory.
    /// If not found, generates a default config file.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory where the configuration file is located or should be created.
    ///
    pub fn load(dir: &str) -> Result<super::Config, ConfError> {
        // Check if the config file exists
        let path = Path::new(dir).join(define::path::CONF_FILE);

        if !path.is_file() {
            // Write the commented default so users can see what each key does.
            let mut file = File::create(&path)?;
            file.write_all(DEFAULT_CONFIG.as_bytes())?;
            log::info!("Default config written to {}", path.display());
        }

        // Load the config
        let conf_str: String = std::fs::read_to_string(&path)?;
        let mut conf: super::Config = ::toml::from_str(&conf_str)?;

        // The key is a deployment secret; the environment wins over the file.
        if let Ok(key) = std::env::var(define::system::API_KEY_ENV) {
            if !key.trim().is_empty() {
                conf.detector.api_key = key;
            }
        }
        Ok(conf)
    }

    /// Saves a configuration file to the given directory.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory where the configuration file should be saved.
    /// * `conf` - The configuration data to be saved.
    ///
    pub fn save(dir: &str, conf: &super::Config) -> Result<(), ConfError> {
        let toml_str = ::toml::to_string(conf)?;
        let path = crate::module::util::path::join(&[dir, define::path::CONF_FILE]);
        let mut file = File::create(path)?;
        file.write_all(toml_str.as_bytes())?;
        Ok(())
    }
}

/// Represents the configuration data structure.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub system: System,
    pub detector: Detector,
    pub camera: Camera,
    pub live: Live,
    pub annotate: Annotate,
}

impl Default for Config {
    fn default() -> Self {
        // The embedded default is part of the binary; failing to parse it is a build defect.
        ::toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| panic!("invalid default config: {e}"))
    }
}

/// Represents system-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct System {
    pub log_level: String,
}

/// Represents inference endpoint configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Detector {
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

/// Represents camera-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Camera {
    pub facing: Facing,
    pub width: u32,
    pub height: u32,
    pub capture_quality: u8,
}

/// Represents live detection configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Live {
    pub interval_ms: u64,
    pub ready_backoff_ms: u64,
    pub ready_timeout_ms: u64,
    pub jpeg_quality: u8,
}

/// Represents annotation rendering configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Annotate {
    pub font_path: String,
    pub font_size: f32,
}

// Default configuration data in TOML format
const DEFAULT_CONFIG: &str = r#"
[system]
  log_level = 'INFO' # Log level ('DEBUG', 'INFO', 'WARN', 'ERROR')

[detector]
  endpoint = 'https://detect.roboflow.com/weed-detection-in-a-field/1' # Inference endpoint
  api_key = '' # Endpoint credential (or set WEEDTRACK_API_KEY)
  timeout_secs = 30 # Request timeout

[camera]
  facing = 'environment' # Preferred camera ('environment' for rear, 'user' for front)
  width = 1280 # Capture width
  height = 720 # Capture height
  capture_quality = 95 # JPEG quality of captured photos

[live]
  interval_ms = 2000 # Period between live detections
  ready_backoff_ms = 100 # Poll period while waiting for the first frame
  ready_timeout_ms = 10000 # Give up starting live mode after this long
  jpeg_quality = 92 # JPEG quality of live payloads

[annotate]
  font_path = '/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf' # Label font
  font_size = 14.0 # Label font size in pixels
"#;
