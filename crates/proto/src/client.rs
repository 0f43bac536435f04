// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client contract for the control plane.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use gantry_sdk::RpcError;

use crate::job::{AcquiredJob, CancelledJob, CompletedJob, JobUpdate};

/// RPC surface the daemon consumes from the control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// Claim the next available job. An empty `job_id` in the response
    /// means nothing was queued; the call is repeatable.
    async fn acquire_job(&self) -> Result<AcquiredJob, RpcError>;

    /// Open the long-lived bidirectional update stream.
    async fn update_job(&self) -> Result<Box<dyn UpdateStream>, RpcError>;

    /// Report a job as failed. Fire-and-forget for the daemon; the
    /// control plane records the error for the user.
    async fn cancel_job(&self, job: CancelledJob) -> Result<(), RpcError>;

    /// Report a job as successfully completed.
    async fn complete_job(&self, job: CompletedJob) -> Result<(), RpcError>;

    /// Tear down the underlying connection. Errors are not reported.
    async fn close(&self);
}

/// Handle to the `UpdateJob` bidirectional stream.
#[async_trait]
pub trait UpdateStream: Send + Sync + 'static {
    /// Send one incremental job update.
    async fn send(&self, update: JobUpdate) -> Result<(), RpcError>;

    /// Resolves once the stream is torn down. This is the connection
    /// liveness signal: the daemon reconnects when it fires.
    async fn closed(&self);

    /// Close the stream. Errors are not reported.
    async fn close(&self);
}

/// Factory for control-plane connections.
///
/// The dialer is opaque to the daemon: authentication, endpoints, and
/// transport all live behind it.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self) -> Result<Arc<dyn ControlPlane>, RpcError>;
}

#[async_trait]
impl<F, Fut> Dialer for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<dyn ControlPlane>, RpcError>> + Send + 'static,
{
    async fn dial(&self) -> Result<Arc<dyn ControlPlane>, RpcError> {
        self().await
    }
}
