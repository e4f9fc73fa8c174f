// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Basic metrics: CloudWatch `AWS/RDS` averages, one sample per (instance, metric) with data.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::catalog::{self, Mode, Source};
use crate::cloudwatch::{GetMetricDataRequest, MetricDataQuery, MAX_QUERIES, SCAN_BY};
use crate::collector::Collector;
use crate::config::Instance;
use crate::errors::CollectError;
use crate::fanout::{self, FanOut};
use crate::sample::{MetricDescriptor, Sample};
use crate::session::SessionProvider;
use crate::stats::ExporterStats;

const LOOK_BACK_SECONDS: i64 = 600;
const MAX_PAGES: usize = 10;

pub struct BasicCollector {
    sessions: Arc<dyn SessionProvider>,
    instances: Vec<Arc<Instance>>,
    fan_out: FanOut,
    stats: Arc<ExporterStats>,
}

impl BasicCollector {
    /// Keeps the instances with basic metrics enabled.
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        instances: &[Instance],
        fan_out: FanOut,
        stats: Arc<ExporterStats>,
    ) -> Self {
        Self {
            sessions,
            instances: instances
                .iter()
                .filter(|i| i.basic_enabled())
                .cloned()
                .map(Arc::new)
                .collect(),
            fan_out,
            stats,
        }
    }

    pub fn instances(&self) -> &[Arc<Instance>] {
        &self.instances
    }
}

/// `m{index}` into the basic catalog.
fn query_id(index: usize) -> String {
    format!("m{index}")
}

fn query_index(id: &str) -> Option<usize> {
    id.strip_prefix('m')?.parse().ok()
}

async fn fetch_instance(
    sessions: Arc<dyn SessionProvider>,
    instance: Arc<Instance>,
) -> Result<Vec<Sample>, CollectError> {
    let session = sessions.session(&instance).await?;
    let definitions = catalog::definitions(Mode::Basic);
    let end_time = Utc::now().timestamp();
    let start_time = end_time - LOOK_BACK_SECONDS;

    // (value, timestamp ms) of the newest datapoint per definition
    let mut latest: Vec<Option<(f64, i64)>> = vec![None; definitions.len()];

    let queries: Vec<MetricDataQuery> = definitions
        .iter()
        .enumerate()
        .filter_map(|(index, definition)| match definition.source {
            Source::CloudWatch(metric_name) => Some(MetricDataQuery::average(
                query_id(index),
                metric_name,
                &instance.instance,
            )),
            _ => None,
        })
        .collect();

    for batch in queries.chunks(MAX_QUERIES) {
        let mut next_token = None;
        for _ in 0..MAX_PAGES {
            let request = GetMetricDataRequest {
                metric_data_queries: batch.to_vec(),
                start_time,
                end_time,
                scan_by: SCAN_BY,
                next_token: next_token.take(),
            };
            let response = session.get_metric_data(&instance.instance, &request).await?;

            for result in &response.metric_data_results {
                let Some(index) = query_index(&result.id).filter(|i| *i < latest.len()) else {
                    debug!("Ignoring unknown query id {} for instance {instance}", result.id);
                    continue;
                };
                if let Some((value, timestamp)) = result.latest() {
                    if latest[index].map_or(true, |(_, seen)| timestamp > seen) {
                        latest[index] = Some((value, timestamp));
                    }
                }
            }

            match response.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
    }

    let labels = catalog::instance_labels(&instance);
    Ok(definitions
        .iter()
        .zip(latest)
        .filter_map(|(definition, datapoint)| {
            datapoint.map(|(value, timestamp)| {
                Sample::new(definition.name, labels.clone(), value)
                    .with_timestamp_ms(Some(timestamp))
            })
        })
        .collect())
}

#[async_trait::async_trait]
impl Collector for BasicCollector {
    fn describe(&self) -> Vec<MetricDescriptor> {
        catalog::definitions(Mode::Basic)
            .iter()
            .map(|definition| definition.descriptor())
            .collect()
    }

    async fn collect(&self) -> Vec<Sample> {
        let results = self
            .fan_out
            .run(Mode::Basic, &self.instances, |instance| {
                fetch_instance(Arc::clone(&self.sessions), instance)
            })
            .await;
        fanout::settle(results, &self.stats)
    }
}
