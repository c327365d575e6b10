//! # Error Handling
//!
//! Custom error types for the download pipeline and how each one becomes an HTTP response.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Result<T, E> Type
//! - Every step of the pipeline returns a `Result`, and `?` stops the request at the
//!   first failure
//! - Failures before the audio stream starts must still be able to carry a clean status,
//!   so none of the pre-stream steps write to the response
//!
//! ### Traits for Error Conversion
//! - **From trait**: turns a `TitleError` into the matching `AppError`
//! - **ResponseError trait**: decides the status code and body for each variant
//! - **Display trait**: the human-readable message that ends up in logs and JSON bodies
//!
//! ## What is *not* here:
//! Once the audio headers are sent, the response is committed. A client disconnect or an
//! extractor that dies mid-stream is only logged by the relay; the client ends up with a
//! truncated file. HTTP has no way to report an error after the status line, so that is
//! accepted behavior rather than something this module can map.

use crate::pipeline::title::TitleError;
use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **InvalidUrl**: the submitted form had no usable URL (302 back to the form)
/// - **TitleResolution**: the video page could not be fetched (500)
/// - **TitleNotFound**: the page had no usable title metadata (500)
/// - **ProcessSpawn**: the extraction tool could not be started (500)
///
/// Startup failures (config, tracing, bind) never reach a handler; `main` reports them
/// through `anyhow` instead.
#[derive(Debug)]
pub enum AppError {
    /// The `url` form field was missing, empty, relative or malformed
    InvalidUrl(String),

    /// Network failure or non-success status while fetching the video page
    TitleResolution(String),

    /// The fetched page carried no `<meta name="title">` value
    TitleNotFound,

    /// The extraction subprocess failed to start
    ProcessSpawn(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            AppError::TitleResolution(msg) => write!(f, "Failed to fetch video title: {}", msg),
            AppError::TitleNotFound => write!(f, "Failed to fetch video title: title not found"),
            AppError::ProcessSpawn(msg) => write!(f, "Failed to start extractor: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Implementation of the ResponseError trait for AppError.
///
/// ## HTTP Status Code Mapping:
/// - InvalidUrl → 302 (Found) with `Location: /`, empty body
/// - everything else → 500 (Internal Server Error)
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "title_not_found",
///     "message": "Failed to fetch video title: title not found",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidUrl(_) => StatusCode::FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_type = match self {
            AppError::InvalidUrl(_) => {
                // Validation failures are recovered by sending the user back to the form.
                return HttpResponse::Found()
                    .insert_header((header::LOCATION, "/"))
                    .finish();
            }
            AppError::TitleResolution(_) => "title_resolution_error",
            AppError::TitleNotFound => "title_not_found",
            AppError::ProcessSpawn(_) => "process_spawn_error",
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<TitleError> for AppError {
    fn from(err: TitleError) -> Self {
        match err {
            TitleError::NotFound => AppError::TitleNotFound,
            other => AppError::TitleResolution(other.to_string()),
        }
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_invalid_url_redirects_to_form() {
        let response = AppError::InvalidUrl("empty".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/"
        );
    }

    #[test]
    fn test_pre_stream_failures_are_server_errors() {
        let errors = [
            AppError::TitleResolution("connection refused".to_string()),
            AppError::TitleNotFound,
            AppError::ProcessSpawn("No such file or directory".to_string()),
        ];

        for error in errors {
            assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(
                error.error_response().status(),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }
    }

    #[actix_web::test]
    async fn test_error_body_is_json() {
        let response = AppError::TitleNotFound.error_response();
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["error"]["type"], "title_not_found");
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("title not found"));
    }

    #[test]
    fn test_title_error_conversion() {
        assert!(matches!(
            AppError::from(TitleError::NotFound),
            AppError::TitleNotFound
        ));
        assert!(matches!(
            AppError::from(TitleError::Status(404)),
            AppError::TitleResolution(_)
        ));
    }
}
