// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution of a single acquired job.
//!
//! A runner is a short-lived task bound to exactly one job. Every fatal
//! step converts into a `CancelJob` with a descriptive message; the
//! daemon itself stays healthy. The cleanup sentinel spawned alongside
//! the runner wipes the work directory and releases the slot exactly
//! once, whether the job completed, failed, or the daemon closed.

use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use gantry_proto::{
    AcquiredJob, CompletedJob, CompletedPayload, JobPayload, JobUpdate, Log, LogSource,
    ProjectImport, RpcError, WorkspaceProvision,
};
use gantry_sdk::{ParseRequest, ParseResponse, Provisioner, ProvisionRequest, ProvisionResponse};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::daemon::DaemonInner;
use crate::unpack;

pub(crate) async fn run_job(
    inner: Arc<DaemonInner>,
    job: Arc<AcquiredJob>,
    cancel: CancellationToken,
    done: CancellationToken,
) {
    spawn_cleanup(Arc::clone(&inner), cancel.clone(), done);

    let Some(provisioner) = inner.opts.provisioners.get(&job.provisioner).cloned() else {
        inner
            .cancel_active_job(format!("provisioner {:?} not registered", job.provisioner))
            .await;
        return;
    };

    let work_dir = inner.opts.work_directory.clone();
    if let Err(e) = create_work_directory(&work_dir) {
        inner
            .cancel_active_job(format!("create work directory {:?}: {}", work_dir, e))
            .await;
        return;
    }

    info!(size_bytes = job.source_archive.len(), "unpacking project source archive");
    let archive = job.source_archive.clone();
    let extract_dir = work_dir.clone();
    let extracted =
        tokio::task::spawn_blocking(move || unpack::extract(&archive, &extract_dir)).await;
    match extracted {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            inner.cancel_active_job(e.to_string()).await;
            return;
        }
        Err(e) => {
            inner.cancel_active_job(format!("unpack project source archive: {e}")).await;
            return;
        }
    }

    match job.payload.as_ref() {
        Some(JobPayload::ProjectImport(import)) => {
            debug!(
                project_history_name = %import.project_history_name,
                "acquired job is project import"
            );
            run_project_import(&inner, &job, &provisioner, import, &cancel).await;
        }
        Some(JobPayload::WorkspaceProvision(provision)) => {
            debug!(
                workspace_name = %provision.workspace_name,
                state_length = provision.state.len(),
                "acquired job is workspace provision"
            );
            run_workspace_provision(&inner, &job, &provisioner, provision, &cancel).await;
        }
        None => {
            inner
                .cancel_active_job(
                    "unknown job type; ensure your provisioner daemon is up-to-date".to_string(),
                )
                .await;
            return;
        }
    }

    cancel.cancel();
    info!("completed job");
}

/// Wipe the work directory and release the slot once the job context
/// ends or the daemon closes. Runs exactly once per job; `done` fires
/// last so `close` can wait on it.
fn spawn_cleanup(inner: Arc<DaemonInner>, cancel: CancellationToken, done: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = inner.closed.cancelled() => {}
            _ = cancel.cancelled() => {}
        }

        match tokio::fs::remove_dir_all(&inner.opts.work_directory).await {
            Ok(()) => debug!("cleaned up work directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    dir = %inner.opts.work_directory.display(),
                    error = %e,
                    "failed to clean up work directory"
                );
            }
        }

        let _guard = inner.acquire_lock.lock().await;
        inner.running.store(false, std::sync::atomic::Ordering::SeqCst);
        done.cancel();
    });
}

/// Work directories are permissive enough for the daemon's own
/// subprocesses only; stricter isolation belongs to a sandboxing layer.
fn create_work_directory(dir: &Path) -> std::io::Result<()> {
    std::fs::DirBuilder::new().recursive(true).mode(0o600).create(dir)
}

async fn run_project_import(
    inner: &DaemonInner,
    job: &AcquiredJob,
    provisioner: &Arc<dyn Provisioner>,
    import: &ProjectImport,
    cancel: &CancellationToken,
) {
    let request = ParseRequest { directory: inner.opts.work_directory.clone() };
    let mut stream = match racing(cancel, provisioner.parse(request)).await {
        Ok(stream) => stream,
        Err(e) => {
            inner.cancel_active_job(format!("parse source: {e}")).await;
            return;
        }
    };

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => {
                inner.cancel_active_job("recv parse source: operation canceled".to_string()).await;
                return;
            }
            msg = stream.recv() => msg,
        };
        let Some(msg) = msg else {
            inner
                .cancel_active_job("recv parse source: unexpected end of stream".to_string())
                .await;
            return;
        };

        match msg {
            ParseResponse::Log(log) => {
                debug!(
                    level = ?log.level,
                    output = %log.output,
                    project_history_id = %import.project_history_id,
                    "parse job logged"
                );
                let update = JobUpdate {
                    job_id: job.job_id.clone(),
                    project_import_logs: vec![Log {
                        source: LogSource::Provisioner,
                        level: log.level,
                        created_at_ms: Utc::now().timestamp_millis(),
                        output: log.output,
                    }],
                    ..Default::default()
                };
                if let Err(e) = send_update(inner, update).await {
                    inner.cancel_active_job(format!("update job: {e}")).await;
                    return;
                }
            }
            ParseResponse::Complete(complete) => {
                let completed = CompletedJob {
                    job_id: job.job_id.clone(),
                    payload: CompletedPayload::ProjectImport {
                        parameter_schemas: complete.parameter_schemas,
                    },
                };
                if let Err(e) = complete_job(inner, completed, cancel).await {
                    inner.cancel_active_job(format!("complete job: {e}")).await;
                }
                // Stop looping: the job is terminal either way.
                return;
            }
        }
    }
}

async fn run_workspace_provision(
    inner: &DaemonInner,
    job: &AcquiredJob,
    provisioner: &Arc<dyn Provisioner>,
    provision: &WorkspaceProvision,
    cancel: &CancellationToken,
) {
    let request = ProvisionRequest {
        directory: inner.opts.work_directory.clone(),
        parameter_values: provision.parameter_values.clone(),
        state: provision.state.clone(),
    };
    let mut stream = match racing(cancel, provisioner.provision(request)).await {
        Ok(stream) => stream,
        Err(e) => {
            inner.cancel_active_job(format!("provision: {e}")).await;
            return;
        }
    };

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => {
                inner
                    .cancel_active_job("recv workspace provision: operation canceled".to_string())
                    .await;
                return;
            }
            msg = stream.recv() => msg,
        };
        let Some(msg) = msg else {
            inner
                .cancel_active_job("recv workspace provision: unexpected end of stream".to_string())
                .await;
            return;
        };

        match msg {
            ProvisionResponse::Log(log) => {
                debug!(
                    level = ?log.level,
                    output = %log.output,
                    workspace_history_id = %provision.workspace_history_id,
                    "workspace provision job logged"
                );
                let update = JobUpdate {
                    job_id: job.job_id.clone(),
                    workspace_provision_logs: vec![Log {
                        source: LogSource::Provisioner,
                        level: log.level,
                        created_at_ms: Utc::now().timestamp_millis(),
                        output: log.output,
                    }],
                    ..Default::default()
                };
                if let Err(e) = send_update(inner, update).await {
                    inner.cancel_active_job(format!("send job update: {e}")).await;
                    return;
                }
            }
            ProvisionResponse::Complete(complete) => {
                info!(
                    resource_count = complete.resources.len(),
                    state_length = complete.state.len(),
                    "provision successful; marking job as complete"
                );
                let completed = CompletedJob {
                    job_id: job.job_id.clone(),
                    payload: CompletedPayload::WorkspaceProvision {
                        state: complete.state,
                        resources: complete.resources,
                    },
                };
                if let Err(e) = complete_job(inner, completed, cancel).await {
                    inner.cancel_active_job(format!("complete job: {e}")).await;
                }
                return;
            }
        }
    }
}

/// Forward one update over the current session's stream. The session
/// handle is taken per call: after a reconnect the next send uses the
/// fresh stream.
async fn send_update(inner: &DaemonInner, update: JobUpdate) -> Result<(), RpcError> {
    let Some(session) = inner.session() else {
        return Err(RpcError::Closed);
    };
    session.updates.send(update).await
}

/// Report terminal success, racing the per-job token so a daemon
/// shutdown mid-RPC surfaces as a cancellation.
async fn complete_job(
    inner: &DaemonInner,
    completed: CompletedJob,
    cancel: &CancellationToken,
) -> Result<(), RpcError> {
    let Some(client) = inner.client() else {
        return Err(RpcError::Closed);
    };
    racing(cancel, client.complete_job(completed)).await
}

/// Race `fut` against the per-job cancel token.
async fn racing<T>(
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = Result<T, RpcError>>,
) -> Result<T, RpcError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RpcError::Canceled),
        result = fut => result,
    }
}
