// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Registry of collectors and the bridge to the prometheus text exposition format.
//!
//! Async [`Collector`]s are described to a [`prometheus::Registry`] up front, so metric and label
//! names are validated and deduplicated by prometheus itself. Their samples are converted into
//! metric families on every gather and merged with the natively registered collectors.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use prometheus::core::{self, Desc, Describer};
use prometheus::proto::{self, LabelPair, MetricFamily, MetricType};
use prometheus::{Encoder, Opts, TextEncoder};
use tracing::{debug, warn};

use crate::collector::Collector;
use crate::errors::RegistryError;
use crate::sample::{MetricDescriptor, MetricKind, Sample};

fn describe(descriptor: &MetricDescriptor) -> Result<Desc, RegistryError> {
    Opts::new(descriptor.name, descriptor.help)
        .variable_labels(descriptor.labels.iter().map(|l| l.to_string()).collect())
        .describe()
        .map_err(|source| RegistryError::InvalidDescriptor {
            name: descriptor.name.to_string(),
            source,
        })
}

/// Reserves the descriptors of an async collector in the prometheus registry. Collects nothing.
struct Described(Vec<Desc>);

impl core::Collector for Described {
    fn desc(&self) -> Vec<&Desc> {
        self.0.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        Vec::new()
    }
}

struct Family {
    descriptor: MetricDescriptor,
    family: MetricFamily,
    seen: HashSet<Vec<String>>,
}

impl Family {
    fn new(descriptor: MetricDescriptor) -> Self {
        let mut family = MetricFamily::default();
        family.set_name(descriptor.name.to_string());
        family.set_help(descriptor.help.to_string());
        family.set_field_type(match descriptor.kind {
            MetricKind::Gauge => MetricType::GAUGE,
            MetricKind::Counter => MetricType::COUNTER,
        });
        Self {
            descriptor,
            family,
            seen: HashSet::new(),
        }
    }

    /// Adds a sample unless its labels don't match the schema or were already seen.
    fn push(&mut self, sample: Sample) -> bool {
        let names_match = sample.labels.len() == self.descriptor.labels.len()
            && sample
                .labels
                .iter()
                .zip(self.descriptor.labels)
                .all(|((name, _), expected)| name == expected);
        if !names_match {
            warn!(
                "Dropping sample of {} with label names not matching {:?}",
                sample.name, self.descriptor.labels
            );
            return false;
        }
        let values: Vec<String> = sample.labels.iter().map(|(_, v)| v.clone()).collect();
        if !self.seen.insert(values) {
            warn!("Dropping duplicate sample of {} {:?}", sample.name, sample.labels);
            return false;
        }

        let mut metric = proto::Metric::default();
        for (name, value) in sample.labels {
            let mut label = LabelPair::default();
            label.set_name(name.to_string());
            label.set_value(value);
            metric.mut_label().push(label);
        }
        match self.descriptor.kind {
            MetricKind::Gauge => {
                let mut gauge = proto::Gauge::default();
                gauge.set_value(sample.value);
                metric.set_gauge(gauge);
            }
            MetricKind::Counter => {
                let mut counter = proto::Counter::default();
                counter.set_value(sample.value);
                metric.set_counter(counter);
            }
        }
        if let Some(timestamp_ms) = sample.timestamp_ms {
            metric.set_timestamp_ms(timestamp_ms);
        }
        self.family.mut_metric().push(metric);
        true
    }
}

/// Collectors served together on one path.
pub struct Registry {
    inner: prometheus::Registry,
    collectors: Vec<Arc<dyn Collector>>,
    schemas: HashMap<&'static str, MetricDescriptor>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: prometheus::Registry::new(),
            collectors: Vec::new(),
            schemas: HashMap::new(),
        }
    }

    /// Rejects the whole collector when any of its descriptors is invalid or already registered.
    pub fn register(&mut self, collector: Arc<dyn Collector>) -> Result<(), RegistryError> {
        let descriptors = collector.describe();
        let descs = descriptors
            .iter()
            .map(describe)
            .collect::<Result<Vec<_>, _>>()?;
        self.inner.register(Box::new(Described(descs)))?;

        for descriptor in descriptors {
            self.schemas.insert(descriptor.name, descriptor);
        }
        self.collectors.push(collector);
        Ok(())
    }

    /// Registers a synchronous prometheus collector, such as a metric vector.
    pub fn register_native(&self, collector: Box<dyn core::Collector>) -> Result<(), RegistryError> {
        Ok(self.inner.register(collector)?)
    }

    /// Collects every registered collector into metric families sorted by name. Samples with an
    /// undescribed name, a mismatched label schema or an already seen label set are dropped.
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let mut families: BTreeMap<&'static str, Family> = BTreeMap::new();
        let mut dropped = 0usize;

        for collector in &self.collectors {
            for sample in collector.collect().await {
                let Some(descriptor) = self.schemas.get(sample.name) else {
                    warn!("Dropping sample of undescribed metric {}", sample.name);
                    dropped += 1;
                    continue;
                };
                let family = families
                    .entry(descriptor.name)
                    .or_insert_with(|| Family::new(*descriptor));
                if !family.push(sample) {
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            debug!("Dropped {dropped} samples while gathering");
        }
        // Read after the async collectors so native counters include this round.
        let mut gathered = self.inner.gather();
        gathered.extend(
            families
                .into_values()
                .map(|f| f.family)
                .filter(|f| !f.get_metric().is_empty()),
        );
        gathered.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        gathered
    }

    /// Current snapshot in the text exposition format.
    pub async fn encode_text(&self) -> Result<Vec<u8>, RegistryError> {
        let families = self.gather().await;
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(buffer)
    }
}
