// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Instance list loaded from the YAML configuration file.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::errors::ConfigError;

/// Account reference used when an instance has no static keys.
pub const DEFAULT_ACCOUNT: &str = "default";

/// One monitored database instance. Immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Instance {
    /// AWS region, e.g. `us-east-1`
    pub region: String,
    /// DB instance identifier, used as the CloudWatch dimension and the `instance` label
    pub instance: String,
    /// DbiResourceId, the log stream holding the enhanced monitoring payloads
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub aws_access_key: Option<String>,
    #[serde(default)]
    pub aws_secret_key: Option<String>,
    #[serde(default)]
    pub disable_basic_metrics: bool,
    #[serde(default)]
    pub disable_enhanced_metrics: bool,
}

/// Where the credentials of an instance come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Account {
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
    /// Environment, then the container credentials endpoint.
    Default,
}

impl Account {
    /// Identity used for session keys and logs. Never contains the secret.
    pub fn id(&self) -> &str {
        match self {
            Self::Static { access_key_id, .. } => access_key_id,
            Self::Default => DEFAULT_ACCOUNT,
        }
    }
}

/// Key of one cached session: an (account, region) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub account: String,
    pub region: String,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.account, self.region)
    }
}

impl Instance {
    pub fn account(&self) -> Account {
        match (&self.aws_access_key, &self.aws_secret_key) {
            (Some(access_key_id), Some(secret_access_key)) => Account::Static {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
            },
            _ => Account::Default,
        }
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            account: self.account().id().to_string(),
            region: self.region.clone(),
        }
    }

    pub fn basic_enabled(&self) -> bool {
        !self.disable_basic_metrics
    }

    pub fn enhanced_enabled(&self) -> bool {
        !self.disable_enhanced_metrics
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.instance)
    }
}

/// Ordered list of monitored instances.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub instances: Vec<Instance>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instances.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one instance must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        // Sessions are keyed by access key, so one key must always come with the same secret.
        let mut secrets: HashMap<&str, &str> = HashMap::new();
        for (index, instance) in self.instances.iter().enumerate() {
            if instance.region.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "instance #{index}: region cannot be empty"
                )));
            }
            if instance.instance.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "instance #{index}: instance identifier cannot be empty"
                )));
            }
            if instance.aws_access_key.is_some() != instance.aws_secret_key.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "instance {instance}: aws_access_key and aws_secret_key must be set together"
                )));
            }
            if let (Some(key), Some(secret)) = (&instance.aws_access_key, &instance.aws_secret_key) {
                if *secrets.entry(key.as_str()).or_insert(secret.as_str()) != secret.as_str() {
                    return Err(ConfigError::Invalid(format!(
                        "instance {instance}: aws_access_key {key} is configured with different secrets"
                    )));
                }
            }
            if instance.disable_basic_metrics && instance.disable_enhanced_metrics {
                return Err(ConfigError::Invalid(format!(
                    "instance {instance}: both basic and enhanced metrics are disabled"
                )));
            }
            if instance.enhanced_enabled()
                && instance
                    .resource_id
                    .as_deref()
                    .map_or(true, |id| id.trim().is_empty())
            {
                return Err(ConfigError::Invalid(format!(
                    "instance {instance}: resource_id is required for enhanced metrics"
                )));
            }
            if !seen.insert((instance.region.as_str(), instance.instance.as_str())) {
                return Err(ConfigError::Invalid(format!(
                    "instance {instance} is configured more than once"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TWO_INSTANCES: &str = r#"
instances:
  - region: us-east-1
    instance: db-1
    resource_id: db-RESOURCE1
    aws_access_key: AKIDEXAMPLE
    aws_secret_key: secret
  - region: us-east-1
    instance: db-2
    disable_enhanced_metrics: true
"#;

    #[test]
    fn test_parse_instances() {
        let config = Config::from_yaml_str(TWO_INSTANCES).expect("config should parse");
        assert_eq!(config.instances.len(), 2);

        let first = &config.instances[0];
        assert!(first.basic_enabled());
        assert!(first.enhanced_enabled());
        assert_eq!(first.resource_id.as_deref(), Some("db-RESOURCE1"));
        assert_eq!(
            first.session_key(),
            SessionKey {
                account: "AKIDEXAMPLE".to_string(),
                region: "us-east-1".to_string()
            }
        );

        let second = &config.instances[1];
        assert!(!second.enhanced_enabled());
        assert_eq!(second.account(), Account::Default);
        assert_eq!(second.session_key().to_string(), "default@us-east-1");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
        file.write_all(TWO_INSTANCES.as_bytes())
            .expect("failed to write config");

        let config = Config::load(file.path()).expect("config should load");
        assert_eq!(config.instances[1].instance, "db-2");
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/definitely/not/here.yml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_empty_instance_list() {
        let err = Config::from_yaml_str("instances: []").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = Config::from_yaml_str("instances: {region").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_enhanced_requires_resource_id() {
        let err = Config::from_yaml_str(
            r#"
instances:
  - region: eu-west-1
    instance: db-1
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("resource_id"));
    }

    #[test]
    fn test_half_configured_keys() {
        let err = Config::from_yaml_str(
            r#"
instances:
  - region: eu-west-1
    instance: db-1
    aws_access_key: AKIDEXAMPLE
    disable_enhanced_metrics: true
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("aws_secret_key"));
    }

    #[test]
    fn test_duplicate_instance() {
        let err = Config::from_yaml_str(
            r#"
instances:
  - region: eu-west-1
    instance: db-1
    disable_enhanced_metrics: true
  - region: eu-west-1
    instance: db-1
    disable_enhanced_metrics: true
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_both_modes_disabled() {
        let err = Config::from_yaml_str(
            r#"
instances:
  - region: eu-west-1
    instance: db-1
    disable_basic_metrics: true
    disable_enhanced_metrics: true
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("both basic and enhanced"));
    }

    #[test]
    fn test_access_key_with_conflicting_secrets() {
        let err = Config::from_yaml_str(
            r#"
instances:
  - region: eu-west-1
    instance: db-1
    aws_access_key: AKIDEXAMPLE
    aws_secret_key: first
    disable_enhanced_metrics: true
  - region: us-east-1
    instance: db-2
    aws_access_key: AKIDEXAMPLE
    aws_secret_key: second
    disable_enhanced_metrics: true
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("different secrets"));
    }

    #[test]
    fn test_access_key_shared_with_same_secret() {
        let config = Config::from_yaml_str(
            r#"
instances:
  - region: eu-west-1
    instance: db-1
    aws_access_key: AKIDEXAMPLE
    aws_secret_key: secret
    disable_enhanced_metrics: true
  - region: us-east-1
    instance: db-2
    aws_access_key: AKIDEXAMPLE
    aws_secret_key: secret
    disable_enhanced_metrics: true
"#,
        )
        .unwrap();
        assert_eq!(config.instances.len(), 2);
    }
}
