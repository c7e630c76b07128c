//! # filevine-dl
//!
//! Mirrors the folder and document tree of a Filevine project onto the local
//! filesystem.
//!
//! ## Design
//!
//! - **Two phases** - the whole remote tree is listed before any download
//!   starts, so every local path is known and collision-free up front
//! - **Isolated failures** - a document or sub-folder that fails is reported
//!   and the rest of the run carries on
//! - **Atomic writes** - files appear at their final path only once complete
//! - **Library-first** - the CLI is a thin wrapper over [`Exporter`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use filevine_dl::{Config, Credentials, Exporter};
//! use std::path::Path;
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod paths;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod tree;
pub mod walker;

#[cfg(test)]
mod test_helpers;

pub use auth::Credentials;
pub use config::{Config, ExistingFileAction, RetryConfig};
pub use error::{Error, Result};
pub use export::Exporter;
pub use report::RunReport;
pub use scheduler::OutcomeStatus;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// Exit status of an interrupted run (128 + SIGINT)
pub const EXIT_INTERRUPTED: u8 = 130;

/// Cancel `cancel` on the first SIGINT or SIGTERM (Ctrl+C elsewhere)
///
/// The listener runs on a spawned task; the returned token is `cancel` itself
/// for convenience. A second interrupt exits the process with
/// [`EXIT_INTERRUPTED`] without waiting for in-flight downloads.
pub fn cancel_on_signal(cancel: CancellationToken) -> CancellationToken {
    tokio::spawn(watch_interrupts(interrupts(), cancel.clone(), || {
        std::process::exit(i32::from(EXIT_INTERRUPTED))
    }));
    cancel
}

/// First interrupt cancels `token`; the next one after that calls `force_quit`
async fn watch_interrupts<S, F>(interrupts: S, token: CancellationToken, force_quit: F)
where
    S: Stream<Item = ()>,
    F: FnOnce(),
{
    let mut interrupts = std::pin::pin!(interrupts);

    tokio::select! {
        Some(()) = interrupts.next() => {
            tracing::warn!("Interrupt received, finishing in-flight downloads");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }

    if interrupts.next().await.is_some() {
        tracing::error!("Second interrupt received, exiting without waiting for downloads");
        force_quit();
    }
}

fn interrupts() -> impl Stream<Item = ()> + Send {
    futures::stream::unfold(Interrupts::register(), |mut signals| async move {
        signals.recv().await;
        Some(((), signals))
    })
}

#[cfg(unix)]
struct Interrupts {
    streams: Option<(tokio::signal::unix::Signal, tokio::signal::unix::Signal)>,
}

#[cfg(unix)]
impl Interrupts {
    fn register() -> Self {
        use tokio::signal::unix::{SignalKind, signal};

        // Signal registration can fail in restricted environments (containers, tests)
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => Self {
                streams: Some((sigterm, sigint)),
            },
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(
                    error = %e,
                    "Could not register signal handlers, using ctrl_c fallback"
                );
                Self { streams: None }
            }
        }
    }

    async fn recv(&mut self) {
        match &mut self.streams {
            Some((sigterm, sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM signal");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT signal (Ctrl+C)");
                    }
                }
            }
            None => {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

#[cfg(not(unix))]
struct Interrupts;

#[cfg(not(unix))]
impl Interrupts {
    fn register() -> Self {
        Self
    }

    async fn recv(&mut self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C signal");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
                std::future::pending::<()>().await;
            }
        }
    }
}
