// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle and the single job slot.
//!
//! The daemon owns one slot: at most one acquired job exists at any
//! instant. The `running` and `cancelled` flags are atomics so any task
//! can observe them without locking; the async `acquire_lock` serialises
//! job acquisition and the end-of-runner state flip.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gantry_proto::{AcquiredJob, CancelledJob, ControlPlane, Dialer, UpdateStream};
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::Provisioners;
use crate::{runner, session};

/// Delay between acquire attempts while idle, unless configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Daemon configuration.
#[derive(Debug)]
pub struct Options {
    /// Time between `AcquireJob` attempts while no job is running.
    /// Zero falls back to [`DEFAULT_POLL_INTERVAL`].
    pub poll_interval: Duration,
    /// Locally available provisioners, keyed by kind.
    pub provisioners: Provisioners,
    /// Scratch directory a job's source archive is extracted into.
    /// Created fresh per job and wiped when the job ends.
    pub work_directory: PathBuf,
}

/// Error recorded when the daemon is closed due to a failure.
///
/// A clean `close` records nothing; `close_with_error` records the cause
/// and every subsequent `close` returns it again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CloseError(pub String);

/// A connected control-plane session: the client plus its update stream.
pub(crate) struct Session {
    pub client: Arc<dyn ControlPlane>,
    pub updates: Box<dyn UpdateStream>,
}

/// The job currently occupying the slot.
pub(crate) struct ActiveJob {
    pub job: Arc<AcquiredJob>,
    /// Per-job cancel handle, a child of the daemon shutdown token.
    pub cancel: CancellationToken,
    /// Fires once cleanup has wiped the work directory and released the
    /// slot.
    pub done: CancellationToken,
}

pub(crate) struct DaemonInner {
    pub opts: Options,
    pub dialer: Box<dyn Dialer>,
    /// Replaced wholesale on reconnect. Callers take the handle lazily
    /// per call rather than caching it across awaits.
    pub session: Mutex<Option<Arc<Session>>>,

    /// Serialises acquire and the end-of-runner state flip. Never held
    /// across the job body.
    pub acquire_lock: tokio::sync::Mutex<()>,
    pub active: Mutex<Option<ActiveJob>>,
    pub running: AtomicBool,
    pub cancelled: AtomicBool,

    /// Root of every per-job cancel token.
    pub shutdown: CancellationToken,
    /// Broadcast observed by every background task.
    pub closed: CancellationToken,
    close_lock: tokio::sync::Mutex<()>,
    close_error: Mutex<Option<CloseError>>,
}

/// Handle to a running provisioner daemon.
pub struct Daemon {
    inner: Arc<DaemonInner>,
}

impl Daemon {
    /// Create and start a provisioner daemon. The session task dials the
    /// control plane in the background; jobs flow as soon as a
    /// connection is up.
    pub fn new(dialer: impl Dialer, mut options: Options) -> Self {
        if options.poll_interval.is_zero() {
            options.poll_interval = DEFAULT_POLL_INTERVAL;
        }
        let inner = Arc::new(DaemonInner {
            opts: options,
            dialer: Box::new(dialer),
            session: Mutex::new(None),
            acquire_lock: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            closed: CancellationToken::new(),
            close_lock: tokio::sync::Mutex::new(()),
            close_error: Mutex::new(None),
        });
        tokio::spawn(session::session_loop(Arc::clone(&inner)));
        Self { inner }
    }

    /// Whether a job currently occupies the slot.
    pub fn is_running_job(&self) -> bool {
        self.inner.is_running_job()
    }

    /// Close the daemon. A running job is cancelled with a graceful
    /// shutdown message and drained before this returns. Idempotent:
    /// repeated calls return the same result.
    pub async fn close(&self) -> Result<(), CloseError> {
        self.inner.close_with(None).await
    }

    /// Close the daemon recording `error` as the cause; a running job is
    /// cancelled with the error text instead of the graceful message.
    pub async fn close_with_error(&self, error: CloseError) -> Result<(), CloseError> {
        self.inner.close_with(Some(error)).await
    }
}

impl DaemonInner {
    pub(crate) fn is_running_job(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }

    pub(crate) fn client(&self) -> Option<Arc<dyn ControlPlane>> {
        self.session.lock().as_ref().map(|s| Arc::clone(&s.client))
    }

    /// Cancel the job in the slot, reporting `err_msg` to the control
    /// plane. Idempotent per job: the `cancelled` CAS guarantees at most
    /// one `CancelJob` RPC is attempted, and the RPC is deliberately not
    /// tied to the per-job token so it can go out while the job context
    /// is being torn down.
    pub(crate) async fn cancel_active_job(&self, err_msg: String) {
        if !self.is_running_job() {
            warn!(error_message = %err_msg, "skipping job cancel; none running");
            return;
        }
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let Some((job_id, cancel)) = ({
            let active = self.active.lock();
            active.as_ref().map(|a| (a.job.job_id.clone(), a.cancel.clone()))
        }) else {
            return;
        };
        cancel.cancel();

        info!(job_id = %job_id, error_message = %err_msg, "canceling running job");
        let Some(client) = self.client() else {
            warn!("failed to notify of cancel; not connected");
            return;
        };
        match client
            .cancel_job(CancelledJob {
                job_id,
                error: format!("provisioner daemon: {err_msg}"),
            })
            .await
        {
            Ok(()) => debug!("canceled running job"),
            Err(error) => {
                warn!(%error, "failed to notify of cancel; job is no longer running");
            }
        }
    }

    async fn close_with(&self, error: Option<CloseError>) -> Result<(), CloseError> {
        let _guard = self.close_lock.lock().await;
        if self.is_closed() {
            return match self.close_error.lock().clone() {
                Some(recorded) => Err(recorded),
                None => Ok(()),
            };
        }

        if self.is_running_job() {
            let message = error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "provisioner daemon was shutdown gracefully".to_string());
            if !self.cancelled.load(Ordering::SeqCst) {
                self.cancel_active_job(message).await;
            }
            let done = self.active.lock().as_ref().map(|a| a.done.clone());
            if let Some(done) = done {
                done.cancelled().await;
            }
        }

        debug!(error = ?error, "closing daemon");
        *self.close_error.lock() = error.clone();
        self.closed.cancel();
        self.shutdown.cancel();

        let session = self.session.lock().take();
        if let Some(session) = session {
            session.updates.close().await;
            session.client.close().await;
        }

        match error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Claim the next job from the control plane and spawn its runner.
/// Serialised by the acquire lock so two acquires cannot race to fill
/// the slot.
pub(crate) async fn acquire_job(inner: &Arc<DaemonInner>, session: &Arc<Session>) {
    let _guard = inner.acquire_lock.lock().await;
    if inner.is_running_job() {
        debug!("skipping acquire; job is already running");
        return;
    }

    let job = tokio::select! {
        _ = inner.closed.cancelled() => return,
        result = session.client.acquire_job() => match result {
            Ok(job) => job,
            Err(error) if error.is_canceled() => return,
            Err(error) => {
                warn!(%error, "acquire job");
                return;
            }
        },
    };
    if inner.is_closed() {
        return;
    }
    if job.job_id.is_empty() {
        debug!("no jobs available");
        return;
    }

    let job = Arc::new(job);
    let cancel = inner.shutdown.child_token();
    let done = CancellationToken::new();
    inner.cancelled.store(false, Ordering::SeqCst);
    inner.running.store(true, Ordering::SeqCst);
    *inner.active.lock() = Some(ActiveJob {
        job: Arc::clone(&job),
        cancel: cancel.clone(),
        done: done.clone(),
    });

    info!(
        organization_name = %job.organization_name,
        project_name = %job.project_name,
        user_name = %job.user_name,
        provisioner = %job.provisioner,
        "acquired job"
    );

    tokio::spawn(runner::run_job(Arc::clone(inner), job, cancel, done));
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
