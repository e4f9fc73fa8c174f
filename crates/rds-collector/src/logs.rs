// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CloudWatch Logs `GetLogEvents` wire types (awsJson1.1).

use serde::{Deserialize, Serialize};

pub const SERVICE: &str = "logs";
pub const TARGET: &str = "Logs_20140328.GetLogEvents";
pub const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Log group RDS writes enhanced monitoring payloads to, one stream per DbiResourceId.
pub const LOG_GROUP: &str = "RDSOSMetrics";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLogEventsRequest {
    pub log_group_name: &'static str,
    pub log_stream_name: String,
    pub limit: u32,
    pub start_from_head: bool,
}

impl GetLogEventsRequest {
    /// Asks for the newest event of a stream only.
    pub fn latest(log_stream_name: &str) -> Self {
        Self {
            log_group_name: LOG_GROUP,
            log_stream_name: log_stream_name.to_string(),
            limit: 1,
            start_from_head: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLogEventsResponse {
    #[serde(default)]
    pub events: Vec<OutputLogEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputLogEvent {
    /// Epoch milliseconds
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub message: String,
}

impl GetLogEventsResponse {
    pub fn newest(&self) -> Option<&OutputLogEvent> {
        self.events.iter().max_by_key(|event| event.timestamp)
    }
}
