// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CloudWatch `GetMetricData` wire types (awsJson1.0).

use serde::{Deserialize, Serialize};

pub const SERVICE: &str = "monitoring";
pub const TARGET: &str = "GraniteServiceVersion20100801.GetMetricData";
pub const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

pub const NAMESPACE: &str = "AWS/RDS";
pub const DIMENSION: &str = "DBInstanceIdentifier";
pub const PERIOD_SECONDS: u32 = 60;
pub const STATISTIC: &str = "Average";
/// Upper bound on queries in one request.
pub const MAX_QUERIES: usize = 500;
pub const SCAN_BY: &str = "TimestampDescending";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetMetricDataRequest {
    pub metric_data_queries: Vec<MetricDataQuery>,
    /// Epoch seconds
    pub start_time: i64,
    pub end_time: i64,
    pub scan_by: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDataQuery {
    pub id: String,
    pub metric_stat: MetricStat,
    pub return_data: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricStat {
    pub metric: Metric,
    pub period: u32,
    pub stat: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metric {
    pub namespace: &'static str,
    pub metric_name: &'static str,
    pub dimensions: Vec<Dimension>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: &'static str,
    pub value: String,
}

impl MetricDataQuery {
    /// Average of one `AWS/RDS` metric of one instance over the standard period.
    pub fn average(id: String, metric_name: &'static str, instance: &str) -> Self {
        Self {
            id,
            metric_stat: MetricStat {
                metric: Metric {
                    namespace: NAMESPACE,
                    metric_name,
                    dimensions: vec![Dimension {
                        name: DIMENSION,
                        value: instance.to_string(),
                    }],
                },
                period: PERIOD_SECONDS,
                stat: STATISTIC,
            },
            return_data: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetMetricDataResponse {
    #[serde(default)]
    pub metric_data_results: Vec<MetricDataResult>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDataResult {
    pub id: String,
    /// Epoch seconds, parallel to `values`
    #[serde(default)]
    pub timestamps: Vec<f64>,
    #[serde(default)]
    pub values: Vec<f64>,
}

impl MetricDataResult {
    /// The datapoint with the most recent timestamp, as `(value, timestamp in ms)`.
    pub fn latest(&self) -> Option<(f64, i64)> {
        self.timestamps
            .iter()
            .zip(&self.values)
            .filter(|(_, value)| value.is_finite())
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(timestamp, value)| (*value, (timestamp * 1000.0) as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = GetMetricDataRequest {
            metric_data_queries: vec![MetricDataQuery::average(
                "m4".to_string(),
                "CPUUtilization",
                "db-1",
            )],
            start_time: 1_700_000_000,
            end_time: 1_700_000_600,
            scan_by: SCAN_BY,
            next_token: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "MetricDataQueries": [{
                    "Id": "m4",
                    "MetricStat": {
                        "Metric": {
                            "Namespace": "AWS/RDS",
                            "MetricName": "CPUUtilization",
                            "Dimensions": [{"Name": "DBInstanceIdentifier", "Value": "db-1"}]
                        },
                        "Period": 60,
                        "Stat": "Average"
                    },
                    "ReturnData": true
                }],
                "StartTime": 1_700_000_000,
                "EndTime": 1_700_000_600,
                "ScanBy": "TimestampDescending"
            })
        );
    }

    #[test]
    fn test_latest_picks_max_timestamp() {
        let result: MetricDataResult = serde_json::from_str(
            r#"{"Id":"m0","Timestamps":[1700000060,1700000120,1700000000],"Values":[2.0,3.0,1.0],"StatusCode":"Complete"}"#,
        )
        .unwrap();
        assert_eq!(result.latest(), Some((3.0, 1_700_000_120_000)));
    }

    #[test]
    fn test_latest_without_datapoints() {
        let result: MetricDataResult = serde_json::from_str(r#"{"Id":"m0"}"#).unwrap();
        assert_eq!(result.latest(), None);
    }
}
