// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::basic::BasicCollector;
use crate::catalog::Mode;
use crate::collector::Collector;
use crate::config::Instance;
use crate::enhanced::EnhancedCollector;
use crate::fanout::FanOut;
use crate::sample::{MetricDescriptor, Sample};
use crate::session::SessionProvider;
use crate::stats::ExporterStats;

/// The object registered with a registry: answers Describe from the catalog and Collect by
/// running the collectors of its modes concurrently.
///
/// The binary builds one per path (`basic` and `enhanced`) so a slow mode never holds up the
/// other's scrape.
pub struct RdsExporter {
    basic: Option<BasicCollector>,
    enhanced: Option<EnhancedCollector>,
}

impl RdsExporter {
    pub fn new(
        modes: &[Mode],
        sessions: Arc<dyn SessionProvider>,
        instances: &[Instance],
        fan_out: FanOut,
        stats: Arc<ExporterStats>,
    ) -> Self {
        let basic = modes.contains(&Mode::Basic).then(|| {
            BasicCollector::new(
                Arc::clone(&sessions),
                instances,
                fan_out,
                Arc::clone(&stats),
            )
        });
        let enhanced = modes.contains(&Mode::Enhanced).then(|| {
            EnhancedCollector::new(
                Arc::clone(&sessions),
                instances,
                fan_out,
                Arc::clone(&stats),
            )
        });
        Self { basic, enhanced }
    }

    pub fn modes(&self) -> Vec<Mode> {
        let mut modes = Vec::new();
        if self.basic.is_some() {
            modes.push(Mode::Basic);
        }
        if self.enhanced.is_some() {
            modes.push(Mode::Enhanced);
        }
        modes
    }
}

#[async_trait::async_trait]
impl Collector for RdsExporter {
    fn describe(&self) -> Vec<MetricDescriptor> {
        let mut descriptors = Vec::new();
        if let Some(basic) = &self.basic {
            descriptors.extend(basic.describe());
        }
        if let Some(enhanced) = &self.enhanced {
            descriptors.extend(enhanced.describe());
        }
        descriptors
    }

    async fn collect(&self) -> Vec<Sample> {
        let start = Instant::now();
        let basic = async {
            match &self.basic {
                Some(basic) => basic.collect().await,
                None => Vec::new(),
            }
        };
        let enhanced = async {
            match &self.enhanced {
                Some(enhanced) => enhanced.collect().await,
                None => Vec::new(),
            }
        };
        let (mut samples, enhanced) = tokio::join!(basic, enhanced);
        samples.extend(enhanced);
        debug!(
            "Collected {} samples for {:?} in {:?}",
            samples.len(),
            self.modes(),
            start.elapsed()
        );
        samples
    }
}
