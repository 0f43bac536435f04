// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane client over a Unix socket.
//!
//! Unary calls are id-tagged request/response frames matched through a
//! pending map; the update stream writes frames on the same socket. A
//! reader task routes responses and fails every pending call when the
//! connection drops.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gantry_sdk::RpcError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::client::{ControlPlane, UpdateStream};
use crate::job::{AcquiredJob, CancelledJob, CompletedJob, JobUpdate};
use crate::wire;

/// One frame sent by the daemon.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ClientFrame {
    Request { id: u64, body: RequestBody },
    Update { update: JobUpdate },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op")]
enum RequestBody {
    AcquireJob,
    CancelJob { job: CancelledJob },
    CompleteJob { job: CompletedJob },
}

/// One frame sent by the control plane.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ServerFrame {
    Response { id: u64, body: ResponseBody },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "result")]
enum ResponseBody {
    Job { job: AcquiredJob },
    Empty,
    Error { message: String },
}

struct Shared {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Mutex<HashMap<u64, oneshot::Sender<ResponseBody>>>,
    next_id: AtomicU64,
    closed: CancellationToken,
}

impl Shared {
    async fn send_frame(&self, frame: &ClientFrame) -> Result<(), RpcError> {
        if self.closed.is_cancelled() {
            return Err(RpcError::Closed);
        }
        let bytes = wire::encode(frame).map_err(|e| RpcError::Transport(e.to_string()))?;
        let mut writer = self.writer.lock().await;
        wire::write_message(&mut *writer, &bytes)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))
    }

    async fn call(&self, body: RequestBody) -> Result<ResponseBody, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if let Err(e) = self.send_frame(&ClientFrame::Request { id, body }).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        tokio::select! {
            _ = self.closed.cancelled() => Err(RpcError::Closed),
            response = rx => response.map_err(|_| RpcError::Closed),
        }
    }

    async fn shutdown(&self) {
        self.closed.cancel();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Control-plane client connected over a Unix socket.
#[derive(Clone)]
pub struct SocketClient {
    shared: Arc<Shared>,
}

impl SocketClient {
    /// Connect to a control plane listening at `path`.
    pub async fn dial(path: &Path) -> Result<Self, RpcError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| RpcError::Transport(format!("connect {}: {}", path.display(), e)))?;
        let (reader, writer) = stream.into_split();
        let shared = Arc::new(Shared {
            writer: tokio::sync::Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: CancellationToken::new(),
        });
        tokio::spawn(read_loop(reader, Arc::clone(&shared)));
        Ok(Self { shared })
    }
}

async fn read_loop(mut reader: OwnedReadHalf, shared: Arc<Shared>) {
    loop {
        let bytes = tokio::select! {
            _ = shared.closed.cancelled() => break,
            result = wire::read_message(&mut reader) => match result {
                Ok(bytes) => bytes,
                Err(_) => break,
            },
        };
        match wire::decode::<ServerFrame>(&bytes) {
            Ok(ServerFrame::Response { id, body }) => {
                if let Some(tx) = shared.pending.lock().remove(&id) {
                    let _ = tx.send(body);
                }
            }
            Err(error) => {
                warn!(%error, "malformed control plane frame");
                break;
            }
        }
    }
    // Dropping the senders fails every in-flight call with Closed.
    shared.closed.cancel();
    shared.pending.lock().clear();
}

#[async_trait]
impl ControlPlane for SocketClient {
    async fn acquire_job(&self) -> Result<AcquiredJob, RpcError> {
        match self.shared.call(RequestBody::AcquireJob).await? {
            ResponseBody::Job { job } => Ok(job),
            ResponseBody::Error { message } => Err(RpcError::Transport(message)),
            ResponseBody::Empty => {
                Err(RpcError::Transport("unexpected response to AcquireJob".into()))
            }
        }
    }

    async fn update_job(&self) -> Result<Box<dyn UpdateStream>, RpcError> {
        if self.shared.closed.is_cancelled() {
            return Err(RpcError::Closed);
        }
        Ok(Box::new(SocketUpdateStream { shared: Arc::clone(&self.shared) }))
    }

    async fn cancel_job(&self, job: CancelledJob) -> Result<(), RpcError> {
        expect_empty(self.shared.call(RequestBody::CancelJob { job }).await?)
    }

    async fn complete_job(&self, job: CompletedJob) -> Result<(), RpcError> {
        expect_empty(self.shared.call(RequestBody::CompleteJob { job }).await?)
    }

    async fn close(&self) {
        self.shared.shutdown().await;
    }
}

fn expect_empty(body: ResponseBody) -> Result<(), RpcError> {
    match body {
        ResponseBody::Empty => Ok(()),
        ResponseBody::Error { message } => Err(RpcError::Transport(message)),
        ResponseBody::Job { .. } => Err(RpcError::Transport("unexpected job response".into())),
    }
}

struct SocketUpdateStream {
    shared: Arc<Shared>,
}

#[async_trait]
impl UpdateStream for SocketUpdateStream {
    async fn send(&self, update: JobUpdate) -> Result<(), RpcError> {
        self.shared.send_frame(&ClientFrame::Update { update }).await
    }

    async fn closed(&self) {
        self.shared.closed.cancelled().await;
    }

    async fn close(&self) {
        self.shared.shutdown().await;
    }
}

#[cfg(test)]
#[path = "socket_tests.rs"]
mod tests;
