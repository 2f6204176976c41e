use std::path::PathBuf;

use crate::gemini::DEMO_KEY;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-pro-preview";

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub port: u16,
    /// When set, sessions persist as files under this directory instead of in memory.
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            api_key: var("GEMINI_API_KEY").unwrap_or_else(|| DEMO_KEY.into()),
            api_base: var("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into()),
            image_model: var("GEMINI_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.into()),
            text_model: var("GEMINI_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.into()),
            port: var("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            data_dir: var("STUDIO_DATA_DIR").map(PathBuf::from),
        }
    }

    /// Offline configuration: placeholder images and canned text, in-memory sessions.
    pub fn demo() -> Self {
        Self {
            api_key: DEMO_KEY.into(),
            api_base: DEFAULT_API_BASE.into(),
            image_model: DEFAULT_IMAGE_MODEL.into(),
            text_model: DEFAULT_TEXT_MODEL.into(),
            port: 8080,
            data_dir: None,
        }
    }

    /// First characters of the key, for startup logs.
    pub fn masked_key(&self) -> String {
        let shown: String = self.api_key.chars().take(6).collect();
        format!("{shown}...")
    }
}
