// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job messages exchanged with the control plane.

use gantry_sdk::{LogLevel, ParameterSchema, ParameterValue, Resource};
use serde::{Deserialize, Serialize};

/// Origin of a forwarded log record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    #[default]
    Provisioner,
    ProvisionerDaemon,
}

/// A log record forwarded to the control plane over the update stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub source: LogSource,
    pub level: LogLevel,
    /// UTC wall-clock time in milliseconds since the epoch.
    pub created_at_ms: i64,
    pub output: String,
}

/// A job claimed from the control plane.
///
/// An empty `job_id` means no work was available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquiredJob {
    pub job_id: String,
    /// Kind of provisioner this job must be executed with.
    pub provisioner: String,
    pub organization_name: String,
    pub project_name: String,
    pub user_name: String,
    /// Tar-formatted project source, extracted into the work directory.
    #[serde(default)]
    pub source_archive: Vec<u8>,
    /// Typed payload. `None` when the control plane sent a job kind this
    /// daemon does not understand.
    #[serde(default)]
    pub payload: Option<JobPayload>,
}

/// The two job kinds a provisioner daemon executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobPayload {
    ProjectImport(ProjectImport),
    WorkspaceProvision(WorkspaceProvision),
}

/// Parse a template source tree to extract its parameter schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectImport {
    pub project_history_id: String,
    pub project_history_name: String,
}

/// Realise infrastructure for a workspace from a parameterised template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceProvision {
    pub workspace_history_id: String,
    pub workspace_name: String,
    pub parameter_values: Vec<ParameterValue>,
    /// Opaque provisioner state from the previous run.
    #[serde(default)]
    pub state: Vec<u8>,
}

/// Incremental progress sent while a job runs.
///
/// Logs are routed into the field matching the job kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_import_logs: Vec<Log>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspace_provision_logs: Vec<Log>,
}

/// Terminal failure report for a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledJob {
    pub job_id: String,
    pub error: String,
}

/// Terminal success report for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedJob {
    pub job_id: String,
    pub payload: CompletedPayload,
}

/// Kind-specific completion payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletedPayload {
    ProjectImport {
        parameter_schemas: Vec<ParameterSchema>,
    },
    WorkspaceProvision {
        state: Vec<u8>,
        resources: Vec<Resource>,
    },
}
