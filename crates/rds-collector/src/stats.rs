// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Self-observability counters: upstream API traffic and per-mode fetch failures.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{IntCounterVec, Opts};

use crate::catalog::Mode;
use crate::errors::CollectError;

const API_REQUESTS: &str = "rds_exporter_api_requests_total";
const API_REQUEST_ERRORS: &str = "rds_exporter_api_request_errors_total";
const FETCH_FAILURES: &str = "rds_exporter_fetch_failures_total";

/// Upstream API operations issued by sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Api {
    #[display("GetMetricData")]
    GetMetricData,
    #[display("GetLogEvents")]
    GetLogEvents,
}

impl Api {
    const ALL: [Api; 2] = [Api::GetMetricData, Api::GetLogEvents];
}

/// Shared by the transport and both orchestrators. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct ExporterStats {
    api_requests: IntCounterVec,
    api_request_errors: IntCounterVec,
    fetch_failures: IntCounterVec,
}

impl ExporterStats {
    /// Every (api) and (mode, kind) series starts at zero so the exposed cardinality never changes.
    pub fn new() -> Result<Self, prometheus::Error> {
        let stats = Self {
            api_requests: IntCounterVec::new(
                Opts::new(API_REQUESTS, "Requests issued to the monitoring APIs."),
                &["api"],
            )?,
            api_request_errors: IntCounterVec::new(
                Opts::new(API_REQUEST_ERRORS, "Requests to the monitoring APIs that failed."),
                &["api"],
            )?,
            fetch_failures: IntCounterVec::new(
                Opts::new(
                    FETCH_FAILURES,
                    "Instance fetches that produced no samples, by mode and error kind.",
                ),
                &["mode", "kind"],
            )?,
        };
        for api in Api::ALL {
            let api = api.to_string();
            stats.api_requests.with_label_values(&[api.as_str()]);
            stats.api_request_errors.with_label_values(&[api.as_str()]);
        }
        for mode in Mode::ALL {
            let mode = mode.to_string();
            for kind in CollectError::KINDS {
                stats.fetch_failures.with_label_values(&[mode.as_str(), kind]);
            }
        }
        Ok(stats)
    }

    pub fn record_request(&self, api: Api) {
        let api = api.to_string();
        self.api_requests.with_label_values(&[api.as_str()]).inc();
    }

    pub fn record_request_error(&self, api: Api) {
        let api = api.to_string();
        self.api_request_errors.with_label_values(&[api.as_str()]).inc();
    }

    pub fn record_fetch_failure(&self, mode: Mode, error: &CollectError) {
        let mode = mode.to_string();
        self.fetch_failures
            .with_label_values(&[mode.as_str(), error.kind()])
            .inc();
    }

    pub fn requests(&self, api: Api) -> u64 {
        let api = api.to_string();
        self.api_requests.with_label_values(&[api.as_str()]).get()
    }

    pub fn request_errors(&self, api: Api) -> u64 {
        let api = api.to_string();
        self.api_request_errors.with_label_values(&[api.as_str()]).get()
    }

    /// Unknown kinds read as zero without creating a series.
    pub fn fetch_failures(&self, mode: Mode, kind: &str) -> u64 {
        if !CollectError::KINDS.contains(&kind) {
            return 0;
        }
        let mode = mode.to_string();
        self.fetch_failures
            .with_label_values(&[mode.as_str(), kind])
            .get()
    }
}

impl Collector for ExporterStats {
    fn desc(&self) -> Vec<&Desc> {
        self.api_requests
            .desc()
            .into_iter()
            .chain(self.api_request_errors.desc())
            .chain(self.fetch_failures.desc())
            .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut families = self.api_requests.collect();
        families.extend(self.api_request_errors.collect());
        families.extend(self.fetch_failures.collect());
        families
    }
}
