//! Service configuration
//!
//! Loaded from a TOML file where every section and key is optional, then
//! overridden from the command line / environment by `main`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detection::ocr;
use crate::detection::preprocessing::{Binarizer, DEFAULT_FIXED_CUTOFF};
use crate::error::{Error, Result};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "resibox.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub actuator: ActuatorConfig,
    pub ocr: OcrConfig,
    pub preprocess: PreprocessConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Uploads above this size are rejected before the pipeline runs
    pub max_upload_bytes: usize,
    pub pipeline_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            pipeline_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
    /// Long-poll timeout passed to getUpdates
    pub poll_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
            request_timeout_secs: 15,
        }
    }
}

impl TelegramConfig {
    /// Token and chat id, when both are set and non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.bot_token.as_deref().filter(|t| !t.is_empty())?;
        let chat = self.chat_id.as_deref().filter(|c| !c.is_empty())?;
        Some((token, chat))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.43.145".to_string(),
            timeout_secs: 10,
        }
    }
}

impl ActuatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub enabled: bool,
    /// Directory holding text-detection.rten and text-recognition.rten
    pub model_dir: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: None,
        }
    }
}

impl OcrConfig {
    pub fn resolved_model_dir(&self) -> Result<PathBuf> {
        match &self.model_dir {
            Some(dir) => Ok(dir.clone()),
            None => ocr::default_model_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub fixed_cutoff: u8,
    pub otsu: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            fixed_cutoff: DEFAULT_FIXED_CUTOFF,
            otsu: true,
        }
    }
}

impl PreprocessConfig {
    pub fn binarizer(&self) -> Binarizer {
        Binarizer {
            fixed_cutoff: self.fixed_cutoff,
            otsu: self.otsu,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if given, else `resibox.toml` if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.server.pipeline_timeout_secs)
    }
}
