//! # Configuration Management
//!
//! This module loads the settings for the download service from several sources:
//! - Built-in defaults (the `Default` impl below)
//! - An optional `config.toml` next to the binary
//! - Environment variables with the `APP_` prefix
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: derive `Serialize`/`Deserialize` so the `config` crate can merge sources into our structs
//! - **Option<T>**: settings that may legitimately be absent (e.g. the title fetch timeout)
//! - **Result<T, E>**: loading and validation both fail loudly instead of starting a broken server
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_EXTRACTOR__PROGRAM`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values
//!
//! Nested keys are separated by a double underscore because several field names
//! (`content_type`, `chunk_size`, ...) contain single underscores themselves.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration.
///
/// Loaded once at startup and never mutated afterwards, so request handlers
/// can share it through an `Arc` without any locking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub extractor: ExtractorConfig,
    pub title: TitleConfig,
    pub relay: RelayConfig,
}

/// Where the HTTP server listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// How the external audio extraction tool is invoked.
///
/// ## Fields:
/// - `program`: executable name or path (looked up on `PATH` when bare)
/// - `format`: format selector handed to the tool; must pick an audio-only track
/// - `extension`: file extension appended to the downloaded filename
/// - `content_type`: value of the `Content-Type` response header
/// - `extra_args`: additional arguments placed before the output target
///
/// Any tool that accepts `--quiet -f <format> -o - <url>` and writes audio to
/// stdout can be substituted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub program: String,
    pub format: String,
    pub extension: String,
    pub content_type: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Settings for the page fetch that resolves the video title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    pub user_agent: String,
    /// No timeout is applied when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Settings for copying extractor output into the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Upper bound on the size of a single body chunk, in bytes.
    pub chunk_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            extractor: ExtractorConfig {
                program: "yt-dlp".to_string(),
                format: "ba[ext=m4a]".to_string(), // best audio-only track in an m4a container
                extension: "m4a".to_string(),
                content_type: "audio/m4a".to_string(),
                extra_args: Vec::new(),
            },
            title: TitleConfig {
                user_agent: concat!("audio-relay/", env!("CARGO_PKG_VERSION")).to_string(),
                timeout_secs: None,
            },
            relay: RelayConfig { chunk_size: 8192 },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml`, and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`
    /// - `APP_EXTRACTOR__PROGRAM=/usr/local/bin/yt-dlp`
    /// - `APP_RELAY__CHUNK_SIZE=16384`
    /// - `APP_EXTRACTOR__EXTRA_ARGS="-m yt_dlp"`: space-separated list
    /// - `PORT=3000`: special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(" ")
                    .with_list_parse_key("extractor.extra_args")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject settings that would make every download fail.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.extractor.program.trim().is_empty() {
            return Err(anyhow::anyhow!("Extractor program must not be empty"));
        }

        if self.extractor.format.trim().is_empty() {
            return Err(anyhow::anyhow!("Extractor format selector must not be empty"));
        }

        if self.extractor.extension.is_empty()
            || !self
                .extractor
                .extension
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(anyhow::anyhow!(
                "Extractor extension must be a non-empty alphanumeric string"
            ));
        }

        if self.extractor.content_type.trim().is_empty() {
            return Err(anyhow::anyhow!("Extractor content type must not be empty"));
        }

        if self.title.user_agent.trim().is_empty() {
            return Err(anyhow::anyhow!("Title user agent must not be empty"));
        }

        if self.relay.chunk_size == 0 {
            return Err(anyhow::anyhow!("Relay chunk size must be greater than 0"));
        }

        Ok(())
    }

    /// The title fetch timeout, if one is configured.
    pub fn title_timeout(&self) -> Option<Duration> {
        self.title.timeout_secs.map(Duration::from_secs)
    }
}
