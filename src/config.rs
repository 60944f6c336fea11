//! Configuration for the Voicelink gateway

use std::env;
use std::path::PathBuf;

use crate::{Error, Result};

/// Default upstream model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-native-audio-dialog";

/// Default Gemini Live API host
pub const DEFAULT_UPSTREAM_HOST: &str = "generativelanguage.googleapis.com";

/// Default behavioral constraint passed verbatim to the upstream engine
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are a friendly voice assistant. \
Keep responses concise and conversational, and answer in the user's \
language when it is obvious.";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Upstream model identifier
    pub model: String,

    /// Upstream API credential
    pub api_key: String,

    /// System instruction for every upstream session
    pub system_instruction: String,

    /// Path to static files directory (web UI), if any
    pub static_dir: Option<PathBuf>,

    /// Upstream host (overridable for proxies and tests)
    pub upstream_host: String,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `GEMINI_API_KEY` is missing or empty.
    pub fn from_env(port: u16, static_dir: Option<PathBuf>) -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config("GEMINI_API_KEY is required".to_string()))?;

        let model = env::var("GEMINI_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let system_instruction = env::var("VOICELINK_SYSTEM_INSTRUCTION")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string());

        let upstream_host = env::var("VOICELINK_UPSTREAM_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_UPSTREAM_HOST.to_string());

        Ok(Self {
            port,
            model,
            api_key,
            system_instruction,
            static_dir,
            upstream_host,
        })
    }
}
