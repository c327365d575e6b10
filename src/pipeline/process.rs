//! # Extraction Process Manager
//!
//! Launches the external audio extractor for one download and owns it until it is reaped.
//!
//! ## Lifecycle:
//! 1. [`Extractor::spawn`] starts the tool with stdout piped. Nothing is awaited, so the
//!    relay can start forwarding bytes as soon as the tool produces them.
//! 2. [`ExtractionProcess::supervise`] moves the child into a supervisor task. The task
//!    waits for whichever happens first: the tool exits, or the request's
//!    `CancellationToken` is cancelled (client went away). On cancellation the child is
//!    killed immediately, without a graceful shutdown.
//! 3. Either way the supervisor waits on the child exactly once, so no zombie is left
//!    behind. The [`ReapHandle`] resolves once that wait is done.
//!
//! The exit status is only logged. By the time the tool exits the response headers are
//! long gone, so a failing extractor shows up to the client as a short file.

use crate::config::ExtractorConfig;
use crate::error::AppError;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// How to invoke the extraction tool.
///
/// Built once from configuration and shared by every request; `spawn` never mutates it.
#[derive(Debug, Clone)]
pub struct Extractor {
    program: String,
    extra_args: Vec<String>,
    format: String,
}

impl Extractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            program: config.program.clone(),
            extra_args: config.extra_args.clone(),
            format: config.format.clone(),
        }
    }

    /// Arguments for one invocation: quiet, audio-only format selector, output to stdout.
    pub fn args(&self, url: &Url) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend([
            "--quiet".to_string(),
            "-f".to_string(),
            self.format.clone(),
            "-o".to_string(),
            "-".to_string(),
            url.to_string(),
        ]);
        args
    }

    /// Starts the extractor for `url`.
    ///
    /// Only stdout is captured. stderr is discarded because nothing on the success
    /// path reads it, and an unread pipe could fill up and stall the tool.
    pub fn spawn(&self, url: &Url) -> Result<ExtractionProcess, AppError> {
        let mut child = Command::new(&self.program)
            .args(self.args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::ProcessSpawn(format!("{}: {}", self.program, e)))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                // kill_on_drop takes care of the child on this path.
                return Err(AppError::ProcessSpawn("stdout was not captured".to_string()));
            }
        };

        let pid = child.id();
        info!(pid = ?pid, program = %self.program, url = %url, "Spawned extractor");

        Ok(ExtractionProcess { child, stdout, pid })
    }
}

/// A running extractor together with its output pipe.
#[derive(Debug)]
pub struct ExtractionProcess {
    child: Child,
    stdout: ChildStdout,
    pid: Option<u32>,
}

impl ExtractionProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Hands the child to a supervisor task and returns the output pipe.
    ///
    /// Cancelling `cancel` kills the child. The returned handle resolves after the child
    /// has been waited on, whichever way it ended.
    pub fn supervise(self, cancel: CancellationToken) -> (ChildStdout, ReapHandle) {
        let ExtractionProcess { child, stdout, pid } = self;

        let task = tokio::spawn(supervise_child(child, pid, cancel));
        let reap = ReapHandle::new(task.map(|joined| {
            joined.unwrap_or_else(|e| ProcessOutcome::WaitFailed(e.to_string()))
        }));

        (stdout, reap)
    }
}

/// How a supervised extractor ended.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Exited on its own
    Exited(ExitStatus),
    /// Killed because the download was cancelled
    Killed(ExitStatus),
    /// Waiting on the child failed; the OS may still hold it
    WaitFailed(String),
}

/// Resolves once the supervised child has been reaped.
///
/// Cloneable: the relay awaits one copy on normal completion, and callers that want
/// to observe teardown after an abort can keep another.
#[derive(Clone)]
pub struct ReapHandle(Shared<BoxFuture<'static, ProcessOutcome>>);

impl ReapHandle {
    /// Wraps any teardown future, for byte sources that are not a child process.
    pub fn new<F>(teardown: F) -> Self
    where
        F: std::future::Future<Output = ProcessOutcome> + Send + 'static,
    {
        Self(teardown.boxed().shared())
    }

    pub async fn wait(self) -> ProcessOutcome {
        self.0.await
    }
}

impl std::fmt::Debug for ReapHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReapHandle").finish_non_exhaustive()
    }
}

async fn supervise_child(
    mut child: Child,
    pid: Option<u32>,
    cancel: CancellationToken,
) -> ProcessOutcome {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                if status.success() {
                    debug!(pid = ?pid, "Extractor exited");
                } else {
                    // The response is already committed; the client just gets a short file.
                    warn!(pid = ?pid, status = %status, "Extractor exited with failure");
                }
                ProcessOutcome::Exited(status)
            }
            Err(e) => {
                warn!(pid = ?pid, error = %e, "Failed to wait for extractor");
                ProcessOutcome::WaitFailed(e.to_string())
            }
        },
        _ = cancel.cancelled() => {
            if let Err(e) = child.start_kill() {
                warn!(pid = ?pid, error = %e, "Failed to kill extractor");
            }
            match child.wait().await {
                Ok(status) => {
                    info!(pid = ?pid, status = %status, "Extractor killed after client abort");
                    ProcessOutcome::Killed(status)
                }
                Err(e) => {
                    warn!(pid = ?pid, error = %e, "Failed to reap killed extractor");
                    ProcessOutcome::WaitFailed(e.to_string())
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use super::Extractor;
    use crate::config::ExtractorConfig;
    use std::path::Path;
    use tempfile::TempDir;

    /// A fake extractor: `/bin/sh <dir>/extractor.sh` running `body`.
    ///
    /// Running the script through `sh` rather than exec'ing it avoids ETXTBSY races
    /// with other tests that fork while the file is being written.
    pub fn fake_extractor(body: &str) -> (TempDir, Extractor, ExtractorConfig) {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("extractor.sh");
        std::fs::write(&script, body).unwrap();

        let config = ExtractorConfig {
            program: "/bin/sh".to_string(),
            extra_args: vec![script.to_string_lossy().into_owned()],
            ..crate::config::AppConfig::default().extractor
        };
        (dir, Extractor::new(&config), config)
    }

    pub fn marker(dir: &Path) -> std::path::PathBuf {
        dir.join("spawned")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::test_support::fake_extractor;
    use super::*;
    use crate::config::AppConfig;
    use std::os::unix::process::ExitStatusExt;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn url() -> Url {
        Url::parse("https://example.com/video123").unwrap()
    }

    #[test]
    fn test_invocation_contract() {
        let extractor = Extractor::new(&AppConfig::default().extractor);
        assert_eq!(
            extractor.args(&url()),
            vec!["--quiet", "-f", "ba[ext=m4a]", "-o", "-", "https://example.com/video123"]
        );
    }

    #[test]
    fn test_extra_args_come_first() {
        let mut config = AppConfig::default().extractor;
        config.extra_args = vec!["-m".to_string(), "yt_dlp".to_string()];
        let args = Extractor::new(&config).args(&url());
        assert_eq!(&args[..3], &["-m", "yt_dlp", "--quiet"]);
        assert_eq!(args.last().unwrap(), "https://example.com/video123");
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let mut config = AppConfig::default().extractor;
        config.program = "/nonexistent/audio-relay-extractor".to_string();
        let result = Extractor::new(&config).spawn(&url());
        assert!(matches!(result, Err(AppError::ProcessSpawn(_))));
    }

    #[tokio::test]
    async fn test_receives_arguments_and_streams_stdout() {
        // Echo the arguments back so the invocation can be checked end to end.
        let (_dir, extractor, _) = fake_extractor("printf '%s|' \"$@\"\n");
        let process = extractor.spawn(&url()).unwrap();
        assert!(process.pid().is_some());

        let (mut stdout, reap) = process.supervise(CancellationToken::new());
        let mut output = String::new();
        stdout.read_to_string(&mut output).await.unwrap();

        assert_eq!(
            output,
            "--quiet|-f|ba[ext=m4a]|-o|-|https://example.com/video123|"
        );
        match reap.wait().await {
            ProcessOutcome::Exited(status) => assert!(status.success()),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failing_exit_is_only_reported() {
        let (_dir, extractor, _) = fake_extractor("printf partial\nexit 3\n");
        let (mut stdout, reap) = extractor
            .spawn(&url())
            .unwrap()
            .supervise(CancellationToken::new());

        let mut output = Vec::new();
        stdout.read_to_end(&mut output).await.unwrap();
        assert_eq!(output, b"partial");

        match reap.wait().await {
            ProcessOutcome::Exited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_kills_and_reaps() {
        let (_dir, extractor, _) = fake_extractor("exec sleep 30\n");
        let cancel = CancellationToken::new();
        let (_stdout, reap) = extractor.spawn(&url()).unwrap().supervise(cancel.clone());

        cancel.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), reap.clone().wait())
            .await
            .expect("extractor was not reaped in time");

        match outcome {
            ProcessOutcome::Killed(status) => assert_eq!(status.signal(), Some(9)),
            other => panic!("unexpected outcome {:?}", other),
        }

        // Every clone observes the same single reap.
        assert!(matches!(reap.wait().await, ProcessOutcome::Killed(_)));
    }
}
