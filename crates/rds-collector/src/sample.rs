// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// How the scrape protocol should type a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// What Describe reports for one metric: its name, help text, type and label schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

/// One observed value. Built fresh on every Collect and dropped once encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: &'static str,
    /// Label pairs in the order of the descriptor's label schema
    pub labels: Vec<(&'static str, String)>,
    pub value: f64,
    /// Observation time, when the upstream data carries one
    pub timestamp_ms: Option<i64>,
}

impl Sample {
    pub fn new(name: &'static str, labels: Vec<(&'static str, String)>, value: f64) -> Self {
        Self {
            name,
            labels,
            value,
            timestamp_ms: None,
        }
    }

    pub fn with_timestamp_ms(mut self, timestamp_ms: Option<i64>) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(label, _)| *label == name)
            .map(|(_, value)| value.as_str())
    }

    /// The (metric name, full label set) identity that must be unique within one Collect.
    pub fn identity(&self) -> (&'static str, Vec<(&'static str, String)>) {
        (self.name, self.labels.clone())
    }
}
