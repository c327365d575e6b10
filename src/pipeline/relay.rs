//! # Stream Relay
//!
//! Copies extractor output into the HTTP response body, one chunk at a time.
//!
//! ## Phases of one relay:
//! ```text
//! Idle ──respond()──▶ HeadersSent ──first poll──▶ Streaming ─┬─ end of data ──▶ Completed
//!                                                            └─ body dropped ──▶ Aborted
//! ```
//!
//! ## Key Rust Concepts:
//! - **Drop**: actix drops the response body when the client disconnects. The
//!   [`AbortGuard`] living inside the body turns that drop into a cancellation of the
//!   request's `CancellationToken`, which is what kills the extractor.
//! - **Streams**: `futures_util::stream::unfold` threads the relay state through each
//!   poll, so the copy loop is just an async closure.
//! - **Generics**: the source is any `AsyncRead`, so nothing here knows it is reading a
//!   child process pipe.
//!
//! Nothing is ever buffered beyond one chunk; backpressure comes from actix only polling
//! the body when the socket can take more.

use crate::pipeline::process::ReapHandle;
use actix_web::http::header;
use actix_web::HttpResponse;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use std::fmt;
use std::io;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where a relay is in its lifecycle. Never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Idle,
    HeadersSent,
    Streaming,
    Completed,
    Aborted,
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayPhase::Idle => "idle",
            RelayPhase::HeadersSent => "headers_sent",
            RelayPhase::Streaming => "streaming",
            RelayPhase::Completed => "completed",
            RelayPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One download's relay, from extractor output to response body.
pub struct Relay<R> {
    source: R,
    reap: ReapHandle,
    guard: AbortGuard,
    chunk_size: usize,
}

impl<R> Relay<R>
where
    R: AsyncRead + Unpin + 'static,
{
    /// Wraps `source`. Dropping the relay at any point before the source is exhausted
    /// cancels `cancel`.
    pub fn new(source: R, reap: ReapHandle, cancel: CancellationToken, chunk_size: usize) -> Self {
        Self {
            source,
            reap,
            guard: AbortGuard::new(cancel),
            chunk_size,
        }
    }

    /// Builds the `200` response: headers first, then the streamed body.
    ///
    /// The headers are final once this returns, so any failure after this point
    /// can only cut the body short.
    pub fn respond(mut self, content_type: &str, content_disposition: &str) -> HttpResponse {
        let mut response = HttpResponse::Ok();
        response
            .insert_header((header::CONTENT_TYPE, content_type))
            .insert_header((header::CONTENT_DISPOSITION, content_disposition));
        self.guard.advance(RelayPhase::HeadersSent);

        response.streaming(self.into_stream())
    }

    /// The body stream on its own, without headers.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + 'static {
        let state = RelayState {
            reader: ReaderStream::with_capacity(self.source, self.chunk_size),
            reap: self.reap,
            guard: self.guard,
        };

        stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            if state.guard.phase != RelayPhase::Streaming {
                state.guard.advance(RelayPhase::Streaming);
            }

            match state.reader.next().await {
                Some(Ok(chunk)) => {
                    state.guard.bytes += chunk.len() as u64;
                    Some((Ok(chunk), Some(state)))
                }
                Some(Err(e)) => {
                    // Yielding the error makes actix drop the connection; the guard kills
                    // the extractor when `state` goes out of scope here.
                    warn!(error = %e, bytes = state.guard.bytes, "Reading extractor output failed");
                    Some((Err(e), None))
                }
                None => {
                    let RelayState { reap, mut guard, .. } = state;
                    // Stays armed until reaped: a disconnect while the extractor lingers
                    // after closing stdout still kills it.
                    let outcome = reap.wait().await;
                    guard.disarm();
                    guard.advance(RelayPhase::Completed);
                    info!(
                        bytes = guard.bytes,
                        duration_ms = guard.started.elapsed().as_millis() as u64,
                        outcome = ?outcome,
                        "Relay completed"
                    );
                    None
                }
            }
        })
    }
}

struct RelayState<R> {
    reader: ReaderStream<R>,
    reap: ReapHandle,
    guard: AbortGuard,
}

/// Cancels the download if dropped while still armed.
struct AbortGuard {
    cancel: CancellationToken,
    armed: bool,
    phase: RelayPhase,
    bytes: u64,
    started: Instant,
}

impl AbortGuard {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            armed: true,
            phase: RelayPhase::Idle,
            bytes: 0,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: RelayPhase) {
        debug!(from = %self.phase, to = %next, "Relay phase change");
        self.phase = next;
    }

    /// The extractor exited on its own and was reaped.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let was = self.phase;
        self.advance(RelayPhase::Aborted);
        info!(
            phase = %was,
            bytes = self.bytes,
            duration_ms = self.started.elapsed().as_millis() as u64,
            "Relay aborted, cancelling extractor"
        );
        self.cancel.cancel();
    }
}
