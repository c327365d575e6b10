//! # Application State
//!
//! Everything a request handler needs, built once at startup and handed to actix.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - actix runs one `App` per worker thread, and each worker gets a clone of this state
//! - `Arc` makes those clones cheap: they all point at the same configuration,
//!   HTTP client and extractor settings
//!
//! ### No locks
//! - Nothing in here changes after startup, so there is no `RwLock` or `Mutex`
//! - Each download owns its own subprocess and response stream; requests never share
//!   mutable state with each other
//!
//! ### Trait objects
//! - `Arc<dyn TitleResolver>` lets tests swap the real HTTP lookup for a stub without
//!   changing the handler

use crate::config::AppConfig;
use crate::pipeline::{Extractor, HttpTitleResolver, TitleResolver};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Shared, read-only state for every request.
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration
    pub config: Arc<AppConfig>,

    /// Looks up the title of a video page
    pub titles: Arc<dyn TitleResolver>,

    /// Spawns the external audio extractor
    pub extractor: Arc<Extractor>,
}

impl AppState {
    /// Build the production state: titles are fetched over HTTP.
    pub fn new(config: AppConfig) -> Result<Self> {
        let resolver = HttpTitleResolver::new(&config.title.user_agent, config.title_timeout())
            .context("Failed to build HTTP client for title lookups")?;
        Ok(Self::with_resolver(config, Arc::new(resolver)))
    }

    /// Build the state around a caller-supplied title resolver.
    pub fn with_resolver(config: AppConfig, titles: Arc<dyn TitleResolver>) -> Self {
        let extractor = Extractor::new(&config.extractor);
        Self {
            config: Arc::new(config),
            titles,
            extractor: Arc::new(extractor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_configuration() {
        let state = AppState::new(AppConfig::default()).unwrap();
        let clone = state.clone();

        assert!(Arc::ptr_eq(&state.config, &clone.config));
        assert!(Arc::ptr_eq(&state.extractor, &clone.extractor));
        assert_eq!(clone.config.extractor.program, "yt-dlp");
    }
}
