//! # upload-batch
//!
//! Bounded-concurrency batch executor with retry and progress reporting, and the
//! file upload client it was built to drive.
//!
//! ## Design Philosophy
//!
//! - **Never lose a result** - every submitted task ends up in the summary, at its
//!   submission index, whether it succeeded, exhausted its retries, or was rejected
//! - **Failures stay local** - one task failing never aborts the batch; only invalid
//!   options reject a batch, and they do so before any work starts
//! - **Bounded concurrency** - a fixed pool of workers pulls tasks from a shared cursor,
//!   so fast workers pick up the slack of slow ones
//!
//! ## Quick Start
//!
//! ```no_run
//! use upload_batch::{BatchOptions, TaskError, run_batch, task};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tasks = vec!["a.png", "b.png", "c.png"]
//!         .into_iter()
//!         .map(|name| task(move || async move { Ok::<_, TaskError>(format!("/file/{name}")) }))
//!         .collect();
//!
//!     let summary = run_batch(
//!         tasks,
//!         BatchOptions::default()
//!             .with_concurrency(2)
//!             .on_progress(|event| println!("{}/{} ({}%)", event.completed, event.total, event.percent)),
//!     )
//!     .await?;
//!
//!     println!("{} of {} succeeded", summary.succeeded, summary.total);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Batch executor (worker pool, result slots, progress)
pub mod executor;
/// Retry logic with linear backoff
pub mod retry;
/// Core data types
pub mod types;
/// File validation and upload
pub mod upload;

// Re-export commonly used types
pub use config::{BatchConfig, Config, RetryConfig, UploadConfig};
pub use error::{Error, Result, TaskError};
pub use executor::{BatchExecutor, BatchOptions, ProgressCallback, run_batch, run_one};
pub use retry::{IsRetryable, RetryPolicy, TaskState};
pub use tokio_util::sync::CancellationToken;
pub use types::{
    AttemptOutcome, BatchSummary, ProgressEvent, Task, TaskDescriptor, TaskResult, task,
};
pub use upload::{
    FileUpload, HttpUploader, UploadRecord, UploadedFile, Uploader, ValidationReport,
    ValidationRules, upload_file, upload_files,
};

/// Cancellation token that fires on the first termination signal.
///
/// Pass it to [`BatchOptions::with_cancellation`] so Ctrl+C stops a batch from starting
/// new tasks while the ones in flight finish and every task still gets a result.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Must be called from within a Tokio runtime.
///
/// # Example
///
/// ```no_run
/// use upload_batch::{BatchOptions, run_batch, shutdown_token};
///
/// # async fn example(tasks: Vec<upload_batch::Task<String>>) -> upload_batch::Result<()> {
/// let options = BatchOptions::default().with_cancellation(shutdown_token());
/// let summary = run_batch(tasks, options).await?;
/// # let _ = summary;
/// # Ok(())
/// # }
/// ```
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                tracing::info!("Shutdown signal received, no new tasks will be started");
                trigger.cancel();
            }
            _ = trigger.cancelled() => {}
        }
    });
    token
}

/// Resolves on the first SIGTERM or SIGINT
///
/// Handlers that cannot be registered (restricted containers) are skipped; with none
/// left this falls back to `ctrl_c`.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut streams = Vec::new();
    for (kind, name) in [
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::interrupt(), "SIGINT"),
    ] {
        match signal(kind) {
            Ok(stream) => streams.push((stream, name)),
            Err(e) => tracing::warn!(error = %e, signal = name, "Could not register signal handler"),
        }
    }

    if streams.is_empty() {
        tracing::error!("No signal handlers registered, using ctrl_c fallback");
        return wait_for_ctrl_c().await;
    }

    let receivers = streams.iter_mut().map(|(stream, name)| {
        Box::pin(async move {
            stream.recv().await;
            *name
        })
    });
    let (name, _, _) = futures::future::select_all(receivers).await;
    tracing::info!(signal = name, "Received shutdown signal");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await
}

/// Resolves on Ctrl+C; never resolves if the listener cannot be installed
async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
