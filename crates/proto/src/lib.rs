// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane protocol for the provisioner daemon.
//!
//! Message types for acquiring, updating, cancelling, and completing
//! jobs, the client traits the daemon consumes, and a Unix-socket
//! transport speaking the platform wire format (4-byte length prefix,
//! big-endian, followed by a JSON payload).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod job;
mod socket;
pub mod wire;

pub use client::{ControlPlane, Dialer, UpdateStream};
pub use gantry_sdk::RpcError;
pub use job::{
    AcquiredJob, CancelledJob, CompletedJob, CompletedPayload, JobPayload, JobUpdate, Log,
    LogSource, ProjectImport, WorkspaceProvision,
};
pub use socket::SocketClient;
pub use wire::{decode, encode, read_message, write_message, ProtocolError};
