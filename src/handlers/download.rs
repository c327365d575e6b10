//! # Download Handler
//!
//! `POST /download` runs the whole pipeline for one form submission:
//!
//! 1. validate the `url` field (redirect to `/` if unusable)
//! 2. resolve the video title (500 on failure)
//! 3. sanitize it into a filename
//! 4. spawn the extractor (500 on failure)
//! 5. hand the extractor's stdout to the relay, which sets the audio headers and streams
//!
//! Steps 1 to 4 never touch the response, so every failure up to the spawn can still be
//! reported with a clean status. After step 5 the response is committed.

use crate::error::{AppError, AppResult};
use crate::pipeline::{content_disposition, sanitize_filename, validate_url, Relay};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The submitted form. `url` is optional so a missing field is a validation failure
/// (redirect) rather than an extractor error (400).
#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: Option<String>,
}

pub async fn download(
    state: web::Data<AppState>,
    form: Option<web::Form<DownloadRequest>>,
) -> AppResult<HttpResponse> {
    let raw = form.as_ref().and_then(|form| form.url.as_deref());
    let url = validate_url(raw).map_err(|reason| {
        debug!(reason, "Rejected download form");
        AppError::InvalidUrl(reason.to_string())
    })?;

    let title = state.titles.resolve(&url).await.map_err(|e| {
        warn!(url = %url, error = %e, "Title resolution failed");
        AppError::from(e)
    })?;

    let filename = sanitize_filename(&title);
    let extractor_config = &state.config.extractor;
    let disposition = content_disposition(&filename, &extractor_config.extension);
    info!(url = %url, title = %title, filename = %filename, "Starting download");

    let process = state.extractor.spawn(&url).map_err(|e| {
        warn!(url = %url, error = %e, "Extractor failed to start");
        e
    })?;
    debug!(pid = ?process.pid(), "Relaying extractor output");

    let cancel = CancellationToken::new();
    let (stdout, reap) = process.supervise(cancel.clone());
    let relay = Relay::new(stdout, reap, cancel, state.config.relay.chunk_size);

    Ok(relay.respond(&extractor_config.content_type, &disposition))
}
