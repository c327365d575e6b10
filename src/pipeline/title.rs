//! # Title Resolution
//!
//! Fetches the video page once and reads its `<meta name="title">` value.
//!
//! The resolver sits behind the [`TitleResolver`] trait so the download endpoint does
//! not care whether the title comes from a live page or from a stub in tests. There is
//! no cache and no retry: one GET per download request.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Why a title could not be resolved.
#[derive(Debug)]
pub enum TitleError {
    /// Transport failure or unreadable body
    Request(reqwest::Error),
    /// The page answered with a non-success status
    Status(u16),
    /// The markup has no usable title metadata
    NotFound,
}

impl fmt::Display for TitleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TitleError::Request(err) => write!(f, "request failed: {}", err),
            TitleError::Status(code) => write!(f, "page returned HTTP {}", code),
            TitleError::NotFound => write!(f, "title not found"),
        }
    }
}

impl std::error::Error for TitleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TitleError::Request(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TitleError {
    fn from(err: reqwest::Error) -> Self {
        TitleError::Request(err)
    }
}

/// Looks up a human-readable title for a video page.
#[async_trait]
pub trait TitleResolver: Send + Sync {
    async fn resolve(&self, url: &Url) -> Result<String, TitleError>;
}

/// Resolves titles by fetching the page over HTTP.
///
/// `reqwest::Client` keeps its own connection pool behind an `Arc`, so one resolver
/// is built at startup and shared by every request.
#[derive(Debug, Clone)]
pub struct HttpTitleResolver {
    client: reqwest::Client,
}

impl HttpTitleResolver {
    pub fn new(user_agent: &str, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl TitleResolver for HttpTitleResolver {
    async fn resolve(&self, url: &Url) -> Result<String, TitleError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TitleError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        debug!(url = %url, bytes = body.len(), "Fetched video page");

        extract_title(&body).ok_or(TitleError::NotFound)
    }
}

/// Reads the `content` attribute of the first `<meta name="title">` tag.
///
/// Entities are decoded by the HTML parser. A blank value on the first tag counts as
/// missing; later tags are not consulted.
pub fn extract_title(markup: &str) -> Option<String> {
    let selector = Selector::parse(r#"meta[name="title"]"#).ok()?;
    let document = Html::parse_document(markup);

    let title = document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("content"))
        .filter(|content| !content.trim().is_empty())
        .map(str::to_string);
    title
}
