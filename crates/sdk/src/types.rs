// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Value types shared by parse and provision streams.

use serde::{Deserialize, Serialize};

/// Severity of a log line emitted by a provisioner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// A log line emitted by a provisioner while parsing or provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub level: LogLevel,
    pub output: String,
}

/// Where a parameter value is injected when the provisioner runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDestination {
    #[default]
    EnvironmentVariable,
    ProvisionerVariable,
}

/// A concrete parameter handed to a provision run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub destination: ParameterDestination,
    pub name: String,
    pub value: String,
}

/// Schema for a single parameter discovered while parsing project source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Default supplied by the template, if any.
    #[serde(default)]
    pub default_value: Option<ParameterValue>,
    /// Whether a workspace may override the default.
    #[serde(default)]
    pub allow_override: bool,
}

/// An infrastructure resource realised by a provision run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}
