// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::sample::{MetricDescriptor, Sample};

/// Two-phase pull contract answered by everything registered with a [`crate::registry::Registry`].
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    /// Static catalog of what `collect` may emit. Must not do any I/O.
    fn describe(&self) -> Vec<MetricDescriptor>;

    /// Current values. Always completes, with partial data when some sources fail.
    async fn collect(&self) -> Vec<Sample>;
}
