// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process settings read from `RDS_EXPORTER_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::catalog::Mode;
use crate::client::ClientConfig;
use crate::errors::ConfigError;
use crate::fanout::FanOut;

const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9042";
const DEFAULT_BASIC_PATH: &str = "/basic";
const DEFAULT_ENHANCED_PATH: &str = "/enhanced";
const DEFAULT_CONFIG_FILE: &str = "config.yml";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_CONCURRENCY: usize = 8;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Which metric paths are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricTypes {
    All,
    Basic,
    Enhanced,
}

impl MetricTypes {
    pub fn modes(self) -> Vec<Mode> {
        match self {
            MetricTypes::All => Mode::ALL.to_vec(),
            MetricTypes::Basic => vec![Mode::Basic],
            MetricTypes::Enhanced => vec![Mode::Enhanced],
        }
    }
}

impl FromStr for MetricTypes {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(MetricTypes::All),
            "basic" => Ok(MetricTypes::Basic),
            "enhanced" => Ok(MetricTypes::Enhanced),
            other => Err(ConfigError::Invalid(format!(
                "unknown metric type {other:?}, expected all, basic or enhanced"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterSettings {
    pub listen_address: String,
    pub basic_path: String,
    pub enhanced_path: String,
    pub config_file: PathBuf,
    pub metric_types: MetricTypes,
    /// Logs signed requests, credentials included
    pub log_trace: bool,
    pub log_level: String,
    /// Worker pool size of each mode
    pub concurrency: usize,
    /// Deadline of a single instance's fetch
    pub fetch_timeout: Duration,
    pub endpoint_url: Option<String>,
    pub https_proxy: Option<String>,
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ExporterSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let metric_types = match non_empty_var("RDS_EXPORTER_METRIC_TYPE") {
            Some(value) => value.parse()?,
            None => MetricTypes::All,
        };
        let log_trace = non_empty_var("RDS_EXPORTER_LOG_TRACE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
        let concurrency = non_empty_var("RDS_EXPORTER_CONCURRENCY")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CONCURRENCY);
        let fetch_timeout_secs = non_empty_var("RDS_EXPORTER_FETCH_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

        let settings = ExporterSettings {
            listen_address: non_empty_var("RDS_EXPORTER_LISTEN_ADDRESS")
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string()),
            basic_path: non_empty_var("RDS_EXPORTER_BASIC_PATH")
                .unwrap_or_else(|| DEFAULT_BASIC_PATH.to_string()),
            enhanced_path: non_empty_var("RDS_EXPORTER_ENHANCED_PATH")
                .unwrap_or_else(|| DEFAULT_ENHANCED_PATH.to_string()),
            config_file: non_empty_var("RDS_EXPORTER_CONFIG_FILE")
                .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string())
                .into(),
            metric_types,
            log_trace,
            log_level: non_empty_var("RDS_EXPORTER_LOG_LEVEL")
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
                .to_lowercase(),
            concurrency,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            endpoint_url: non_empty_var("RDS_EXPORTER_ENDPOINT_URL"),
            https_proxy: non_empty_var("RDS_EXPORTER_PROXY_HTTPS")
                .or_else(|| non_empty_var("HTTPS_PROXY")),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in [&self.basic_path, &self.enhanced_path] {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "metrics path {path:?} must start with '/'"
                )));
            }
        }
        if self.basic_path == self.enhanced_path {
            return Err(ConfigError::Invalid(
                "basic and enhanced metrics paths must differ".to_string(),
            ));
        }
        if self.basic_path == "/" || self.enhanced_path == "/" {
            return Err(ConfigError::Invalid(
                "'/' is reserved for the landing page".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "fetch timeout must be greater than 0".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level {:?}",
                self.log_level
            )));
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: self.fetch_timeout,
            https_proxy: self.https_proxy.clone(),
        }
    }

    pub fn fan_out(&self) -> FanOut {
        FanOut::new(self.concurrency, self.fetch_timeout)
    }
}

#[cfg(test)]
mod tests {
    use duplicate::duplicate_item;
    use serial_test::serial;
    use std::env;

    use super::*;

    const VARS: [&str; 12] = [
        "RDS_EXPORTER_LISTEN_ADDRESS",
        "RDS_EXPORTER_BASIC_PATH",
        "RDS_EXPORTER_ENHANCED_PATH",
        "RDS_EXPORTER_CONFIG_FILE",
        "RDS_EXPORTER_METRIC_TYPE",
        "RDS_EXPORTER_LOG_TRACE",
        "RDS_EXPORTER_LOG_LEVEL",
        "RDS_EXPORTER_CONCURRENCY",
        "RDS_EXPORTER_FETCH_TIMEOUT_SECS",
        "RDS_EXPORTER_ENDPOINT_URL",
        "RDS_EXPORTER_PROXY_HTTPS",
        "HTTPS_PROXY",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let settings = ExporterSettings::from_env().unwrap();
        assert_eq!(settings.listen_address, "0.0.0.0:9042");
        assert_eq!(settings.basic_path, "/basic");
        assert_eq!(settings.enhanced_path, "/enhanced");
        assert_eq!(settings.config_file, PathBuf::from("config.yml"));
        assert_eq!(settings.metric_types, MetricTypes::All);
        assert!(!settings.log_trace);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.fan_out(), FanOut::new(8, Duration::from_secs(10)));
        assert_eq!(settings.endpoint_url, None);
        assert_eq!(settings.client_config().https_proxy, None);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        env::set_var("RDS_EXPORTER_LISTEN_ADDRESS", "127.0.0.1:9100");
        env::set_var("RDS_EXPORTER_CONFIG_FILE", "/etc/rds/config.yml");
        env::set_var("RDS_EXPORTER_LOG_TRACE", "TRUE");
        env::set_var("RDS_EXPORTER_LOG_LEVEL", "DEBUG");
        env::set_var("RDS_EXPORTER_CONCURRENCY", "3");
        env::set_var("RDS_EXPORTER_FETCH_TIMEOUT_SECS", "2");
        env::set_var("HTTPS_PROXY", "http://proxy:3128");

        let settings = ExporterSettings::from_env().unwrap();
        assert_eq!(settings.listen_address, "127.0.0.1:9100");
        assert_eq!(settings.config_file, PathBuf::from("/etc/rds/config.yml"));
        assert!(settings.log_trace);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.fan_out(), FanOut::new(3, Duration::from_secs(2)));
        assert_eq!(
            settings.client_config().https_proxy.as_deref(),
            Some("http://proxy:3128")
        );
        clear_env();
    }

    #[duplicate_item(
        test_name                   metric_type     expected_modes;
        [test_metric_type_all]      ["all"]         [vec![Mode::Basic, Mode::Enhanced]];
        [test_metric_type_basic]    ["basic"]       [vec![Mode::Basic]];
        [test_metric_type_enhanced] ["Enhanced"]    [vec![Mode::Enhanced]];
    )]
    #[test]
    #[serial]
    fn test_name() {
        clear_env();
        env::set_var("RDS_EXPORTER_METRIC_TYPE", metric_type);
        let settings = ExporterSettings::from_env().unwrap();
        assert_eq!(settings.metric_types.modes(), expected_modes);
        clear_env();
    }

    #[duplicate_item(
        test_name                       var                                 value;
        [test_invalid_metric_type]      ["RDS_EXPORTER_METRIC_TYPE"]        ["everything"];
        [test_invalid_basic_path]       ["RDS_EXPORTER_BASIC_PATH"]         ["basic"];
        [test_same_paths]               ["RDS_EXPORTER_ENHANCED_PATH"]      ["/basic"];
        [test_root_path]                ["RDS_EXPORTER_BASIC_PATH"]         ["/"];
        [test_zero_concurrency]         ["RDS_EXPORTER_CONCURRENCY"]        ["0"];
        [test_zero_timeout]             ["RDS_EXPORTER_FETCH_TIMEOUT_SECS"] ["0"];
        [test_invalid_log_level]        ["RDS_EXPORTER_LOG_LEVEL"]          ["loud"];
    )]
    #[test]
    #[serial]
    fn test_name() {
        clear_env();
        env::set_var(var, value);
        let err = ExporterSettings::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
        clear_env();
    }
}
