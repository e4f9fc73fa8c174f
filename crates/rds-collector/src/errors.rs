// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

/// Errors produced while fetching metrics for a single instance or session group.
///
/// Every variant is contained at the instance boundary: the collectors log it, count it and
/// drop that instance's contribution to the current round.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Credentials for an (account, region) group could not be resolved or were rejected.
    #[error("authentication failed for account {account} in {region}: {reason}")]
    AuthFailure {
        account: String,
        region: String,
        reason: String,
    },

    /// A single instance's round-trip exceeded its deadline.
    #[error("fetch for instance {instance} timed out after {timeout:?}")]
    FetchTimeout { instance: String, timeout: Duration },

    /// The enhanced monitoring payload of an instance could not be decoded.
    #[error("malformed enhanced payload for instance {instance}: {reason}")]
    ParseError { instance: String, reason: String },

    /// The monitoring API answered with a non-2xx status.
    #[error("{service} API error: status={status}, code={code}, message={message}")]
    Api {
        service: &'static str,
        status: u16,
        code: String,
        message: String,
    },

    /// An underlying HTTP transport error from `reqwest`.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization or deserialization failure of an API body.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request signing failed.
    #[error("signing error: {0}")]
    Signing(String),
}

impl CollectError {
    /// Every value [`CollectError::kind`] can return, in a stable order.
    pub const KINDS: [&'static str; 7] = [
        "auth", "timeout", "parse", "api", "network", "json", "signing",
    ];

    /// Short stable label used by the failure counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthFailure { .. } => "auth",
            Self::FetchTimeout { .. } => "timeout",
            Self::ParseError { .. } => "parse",
            Self::Api { .. } => "api",
            Self::Network(_) => "network",
            Self::Json(_) => "json",
            Self::Signing(_) => "signing",
        }
    }
}

/// Errors raised while loading or validating configuration. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("can't parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the metrics registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid descriptor for metric {name}: {source}")]
    InvalidDescriptor {
        name: String,
        source: prometheus::Error,
    },

    /// Registration conflicts, such as an already registered name, and encoding failures.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}
