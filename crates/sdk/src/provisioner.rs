// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client contract for locally registered provisioner plugins.
//!
//! The daemon talks to each provisioner through [`Provisioner`]. Both
//! methods open a server stream: the plugin emits any number of `Log`
//! messages followed by exactly one `Complete`. Streams are delivered as
//! bounded mpsc receivers; the channel closing before `Complete` means
//! the plugin went away mid-job.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{Log, ParameterSchema, ParameterValue, Resource};

/// Error surfaced by an RPC call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The call was abandoned because the caller is shutting down.
    #[error("operation canceled")]
    Canceled,
    /// The underlying connection is gone or was never established.
    #[error("connection closed")]
    Closed,
    #[error("transport: {0}")]
    Transport(String),
}

impl RpcError {
    /// Cancellation is benign during shutdown; callers swallow it silently.
    pub fn is_canceled(&self) -> bool {
        matches!(self, RpcError::Canceled)
    }
}

/// Request to parse a project source tree for its parameter schemas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseRequest {
    /// Directory the source archive was extracted into.
    pub directory: PathBuf,
}

/// One message on a `Parse` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParseResponse {
    Log(Log),
    Complete(ParseComplete),
}

/// Terminal message of a successful `Parse` stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseComplete {
    pub parameter_schemas: Vec<ParameterSchema>,
}

/// Request to realise infrastructure from a parameterised template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Directory the source archive was extracted into.
    pub directory: PathBuf,
    pub parameter_values: Vec<ParameterValue>,
    /// Opaque provisioner state from the previous run, empty on first.
    pub state: Vec<u8>,
}

/// One message on a `Provision` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProvisionResponse {
    Log(Log),
    Complete(ProvisionComplete),
}

/// Terminal message of a successful `Provision` stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionComplete {
    /// Opaque provisioner state to persist for the next run.
    pub state: Vec<u8>,
    pub resources: Vec<Resource>,
}

/// A provisioner reachable over RPC.
#[async_trait]
pub trait Provisioner: Send + Sync + 'static {
    /// Parse the source tree at `request.directory` for parameter schemas.
    async fn parse(
        &self,
        request: ParseRequest,
    ) -> Result<mpsc::Receiver<ParseResponse>, RpcError>;

    /// Provision infrastructure from the source tree at `request.directory`.
    async fn provision(
        &self,
        request: ProvisionRequest,
    ) -> Result<mpsc::Receiver<ProvisionResponse>, RpcError>;
}
