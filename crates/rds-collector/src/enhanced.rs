// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Enhanced metrics: the newest OS metrics payload of each instance, decomposed into one sample
//! per recognized numeric leaf.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use tracing::warn;

use crate::catalog::{self, Mode, Source, LIST_SECTIONS};
use crate::collector::Collector;
use crate::config::Instance;
use crate::errors::CollectError;
use crate::fanout::{self, FanOut};
use crate::logs::GetLogEventsRequest;
use crate::payload::Node;
use crate::sample::{MetricDescriptor, Sample};
use crate::session::SessionProvider;
use crate::stats::ExporterStats;

pub struct EnhancedCollector {
    sessions: Arc<dyn SessionProvider>,
    instances: Vec<Arc<Instance>>,
    fan_out: FanOut,
    stats: Arc<ExporterStats>,
}

impl EnhancedCollector {
    /// Keeps the instances with enhanced metrics enabled and a resource id to read from.
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
                .filter(|i| i.enhanced_enabled() && i.resource_id.is_some())
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

async fn fetch_instance(
    sessions: Arc<dyn SessionProvider>,
    instance: Arc<Instance>,
) -> Result<Vec<Sample>, CollectError> {
    let Some(resource_id) = instance.resource_id.as_deref() else {
        return Ok(Vec::new());
    };
    let session = sessions.session(&instance).await?;
    let response = session
        .get_log_events(&instance.instance, &GetLogEventsRequest::latest(resource_id))
        .await?;

    let Some(event) = response.newest() else {
        warn!("No enhanced monitoring events for instance {instance} in stream {resource_id}");
        return Ok(Vec::new());
    };
    let payload = Node::parse(&event.message).map_err(|reason| CollectError::ParseError {
        instance: instance.instance.clone(),
        reason,
    })?;
    Ok(decompose(&payload, &instance, event.timestamp))
}

/// Walks a payload against the enhanced catalog. Anything the catalog doesn't name is skipped.
pub fn decompose(
    payload: &Node,
    instance: &Instance,
    event_timestamp_ms: Option<i64>,
) -> Vec<Sample> {
    let timestamp_ms = payload
        .get("timestamp")
        .and_then(Node::as_str)
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.timestamp_millis())
        .or(event_timestamp_ms);
    let base_labels = catalog::instance_labels(instance);
    let definitions = catalog::definitions(Mode::Enhanced);
    let mut samples = Vec::new();

    for definition in definitions {
        let Source::Field { section, field } = definition.source else {
            continue;
        };
        let node = match section {
            Some(section) => payload.get(section).and_then(|s| s.get(field)),
            None => payload.get(field),
        };
        if let Some(value) = node.and_then(Node::as_f64) {
            samples.push(
                Sample::new(definition.name, base_labels.clone(), value)
                    .with_timestamp_ms(timestamp_ms),
            );
        }
    }

    for list in LIST_SECTIONS {
        let Some(entries) = payload.get(list.section).and_then(Node::as_list) else {
            continue;
        };
        let fields: Vec<_> = definitions
            .iter()
            .filter_map(|definition| match definition.source {
                Source::Entry { section, field } if section == list.section => {
                    Some((definition.name, field))
                }
                _ => None,
            })
            .collect();

        let mut seen = HashSet::new();
        for (position, entry) in entries.iter().enumerate() {
            let identity: Vec<(&'static str, String)> = list
                .identity
                .iter()
                .map(|(label, key)| {
                    let value = entry
                        .get(key)
                        .and_then(Node::as_label)
                        .unwrap_or_else(|| position.to_string());
                    (*label, value)
                })
                .collect();
            if !seen.insert(identity.clone()) {
                warn!(
                    "Duplicate {} entry {identity:?} for instance {instance}, keeping the first",
                    list.section
                );
                continue;
            }

            let mut labels = base_labels.clone();
            labels.extend(identity);
            for &(name, field) in &fields {
                if let Some(value) = entry.get(field).and_then(Node::as_f64) {
                    samples.push(
                        Sample::new(name, labels.clone(), value).with_timestamp_ms(timestamp_ms),
                    );
                }
            }
        }
    }

    samples
}

#[async_trait::async_trait]
impl Collector for EnhancedCollector {
    fn describe(&self) -> Vec<MetricDescriptor> {
        catalog::definitions(Mode::Enhanced)
            .iter()
            .map(|definition| definition.descriptor())
            .collect()
    }

    async fn collect(&self) -> Vec<Sample> {
        let results = self
            .fan_out
            .run(Mode::Enhanced, &self.instances, |instance| {
                fetch_instance(Arc::clone(&self.sessions), instance)
            })
            .await;
        fanout::settle(results, &self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionKey;
    use crate::credentials::Credentials;
    use crate::session::{Session, Transport};
    use mockito::Server;
    use proptest::prelude::*;
    use std::time::Duration;
    use tracing_test::traced_test;

    /// One entry per list section: expands to exactly the 53 enhanced definitions.
    const FULL_PAYLOAD: &str = r#"{
        "engine": "POSTGRES",
        "instanceID": "db-1",
        "instanceResourceID": "db-RESOURCE1",
        "timestamp": "2024-03-01T12:30:00Z",
        "version": 1.0,
        "uptime": "10 days, 01:02:03",
        "numVCPUs": 2,
        "cpuUtilization": {"guest": 0, "irq": 0.01, "system": 1.2, "wait": 0.3, "idle": 95.1, "user": 2.8, "total": 4.9, "steal": 0.1, "nice": 0.5},
        "loadAverageMinute": {"one": 0.2, "five": 0.15, "fifteen": 0.1},
        "memory": {"writeback": 0, "hugePagesFree": 0, "hugePagesRsvd": 0, "hugePagesSurp": 0, "cached": 1000, "hugePagesSize": 2048, "free": 2000, "hugePagesTotal": 0, "inactive": 300, "pageTables": 12, "dirty": 4, "mapped": 50, "active": 700, "total": 8000, "slab": 60, "buffers": 20},
        "tasks": {"sleeping": 120, "zombie": 0, "running": 1, "stopped": 0, "total": 121, "blocked": 0},
        "swap": {"cached": 0, "total": 4096, "free": 4096, "in": 0, "out": 0},
        "network": [{"interface": "eth0", "rx": 1500.5, "tx": 700.25}],
        "diskIO": [{"device": "rdsdev", "writeKbPS": 12, "readIOsPS": 0.5, "await": 1.1, "readKbPS": 3, "rrqmPS": 0, "util": 0.4, "avgQueueLen": 0.01, "tps": 2, "readKb": 9, "writeKb": 36, "avgReqSz": 8, "wrqmPS": 1, "writeIOsPS": 1.5}],
        "fileSys": [{"used": 500, "name": "rdsfilesys", "usedFiles": 40, "usedFilePercent": 0.1, "maxFiles": 40000, "mountPoint": "/rdsdbdata", "total": 10000, "usedPercent": 5}],
        "processList": [{"vss": 1000, "name": "postgres", "tgid": 42, "parentID": 1, "memoryUsedPc": 1.5, "cpuUsedPc": 0.2, "id": 42, "rss": 300}]
    }"#;

    fn instance() -> Instance {
        Instance {
            region: "us-east-1".to_string(),
            instance: "db-1".to_string(),
            resource_id: Some("db-RESOURCE1".to_string()),
            aws_access_key: None,
            aws_secret_key: None,
            disable_basic_metrics: false,
            disable_enhanced_metrics: false,
        }
    }

    fn decompose_str(payload: &str) -> Vec<Sample> {
        decompose(&Node::parse(payload).unwrap(), &instance(), Some(1))
    }

    #[test]
    fn test_full_payload_covers_catalog() {
        let samples = decompose_str(FULL_PAYLOAD);
        assert_eq!(samples.len(), catalog::definitions(Mode::Enhanced).len());

        let identities: HashSet<_> = samples.iter().map(Sample::identity).collect();
        assert_eq!(identities.len(), samples.len());
        assert!(samples
            .iter()
            .all(|s| s.timestamp_ms == Some(1_709_296_200_000)));
    }

    #[test]
    fn test_section_identity_labels() {
        let samples = decompose_str(FULL_PAYLOAD);
        let find = |name: &str| samples.iter().find(|s| s.name == name).unwrap();

        assert_eq!(find("rds_enhanced_network_rx_bytes_per_second").label("interface"), Some("eth0"));
        assert_eq!(find("rds_enhanced_disk_read_iops").label("device"), Some("rdsdev"));
        let fs = find("rds_enhanced_filesystem_used_percent");
        assert_eq!(fs.label("name"), Some("rdsfilesys"));
        assert_eq!(fs.label("mount_point"), Some("/rdsdbdata"));
        let process = find("rds_enhanced_process_rss_kilobytes");
        assert_eq!(process.label("process"), Some("postgres"));
        assert_eq!(process.label("pid"), Some("42"));
        assert_eq!(process.value, 300.0);
        assert_eq!(process.labels[0], ("instance", "db-1".to_string()));
        assert_eq!(process.labels[1], ("region", "us-east-1".to_string()));
    }

    #[test]
    fn test_missing_identity_uses_position_and_duplicates_are_dropped() {
        let samples = decompose_str(
            r#"{"diskIO":[{"device":"sda","tps":1},{"tps":2},{"device":"sda","tps":3}]}"#,
        );
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label("device"), Some("sda"));
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(samples[1].label("device"), Some("1"));
        assert_eq!(samples[1].timestamp_ms, Some(1));
    }

    #[test]
    fn test_non_numeric_fields_are_skipped() {
        let samples = decompose_str(r#"{"numVCPUs":"two","memory":{"free":null,"total":5},"network":{"rx":1}}"#);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "rds_enhanced_memory_total_kilobytes");
    }

    proptest! {
        #[test]
        fn test_unknown_fields_never_change_sample_count(
            extra in proptest::collection::btree_map("x_[a-z]{1,8}", -1.0e6f64..1.0e6, 0..8),
            section in prop_oneof![Just("memory"), Just("cpuUtilization"), Just("tasks")],
        ) {
            let mut value: serde_json::Value = serde_json::from_str(FULL_PAYLOAD).unwrap();
            for (key, number) in &extra {
                value[key.as_str()] = serde_json::json!(number);
                value[section][key.as_str()] = serde_json::json!(number);
                value["network"][0][key.as_str()] = serde_json::json!(number);
                value[format!("{key}_section")] = serde_json::json!({"a": number});
            }
            let samples = decompose_str(&value.to_string());
            prop_assert_eq!(samples.len(), catalog::definitions(Mode::Enhanced).len());
        }
    }

    struct FixedSession(Arc<Session>);

    #[async_trait::async_trait]
    impl SessionProvider for FixedSession {
        async fn session(&self, _instance: &Instance) -> Result<Arc<Session>, CollectError> {
            Ok(Arc::clone(&self.0))
        }
    }

    fn collector(url: String, stats: Arc<ExporterStats>) -> EnhancedCollector {
        let mut transport = Transport::new(reqwest::Client::new(), Arc::clone(&stats));
        transport.endpoint_override = Some(url);
        let session = Session::new(
            SessionKey {
                account: "default".to_string(),
                region: "us-east-1".to_string(),
            },
            Credentials::new("AKIDEXAMPLE", "secret", None),
            Arc::new(transport),
        );
        EnhancedCollector::new(
            Arc::new(FixedSession(Arc::new(session))),
            &[instance()],
            FanOut::new(2, Duration::from_secs(5)),
            stats,
        )
    }

    #[tokio::test]
    async fn test_collect_from_log_events() {
        let mut server = Server::new_async().await;
        let body = serde_json::json!({
            "events": [{"timestamp": 1_709_296_200_000i64, "message": FULL_PAYLOAD}]
        });
        let _mock = server
            .mock("POST", "/")
            .match_header("x-amz-target", "Logs_20140328.GetLogEvents")
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let samples = collector(server.url(), Arc::new(ExporterStats::new().unwrap()))
            .collect()
            .await;
        assert_eq!(samples.len(), 53);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_malformed_payload_is_logged() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"events":[{"timestamp":1,"message":"{\"numVCPUs\": 2,"}]}"#)
            .create_async()
            .await;

        let stats = Arc::new(ExporterStats::new().unwrap());
        let samples = collector(server.url(), Arc::clone(&stats)).collect().await;
        assert!(samples.is_empty());
        assert!(logs_contain("malformed enhanced payload for instance db-1"));
        assert_eq!(stats.fetch_failures(Mode::Enhanced, "parse"), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_stream() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"events":[]}"#)
            .create_async()
            .await;

        let stats = Arc::new(ExporterStats::new().unwrap());
        let samples = collector(server.url(), Arc::clone(&stats)).collect().await;
        assert!(samples.is_empty());
        assert!(logs_contain("No enhanced monitoring events for instance"));
        assert_eq!(stats.fetch_failures(Mode::Enhanced, "parse"), 0);
    }
}
