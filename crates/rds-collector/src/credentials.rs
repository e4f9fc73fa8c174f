// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Credential resolution for session groups.
//!
//! Static keys from the configuration are used as-is. Instances without keys go through the
//! default chain: the `AWS_*` environment variables first, then the container credentials
//! endpoint, which costs one HTTP round-trip.

use std::env;
use std::fmt::Debug;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Account;
use crate::errors::CollectError;

const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
const ENV_CONTAINER_FULL_URI: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";
const ENV_CONTAINER_RELATIVE_URI: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";
const ENV_CONTAINER_AUTH_TOKEN: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN";
const CONTAINER_CREDENTIALS_HOST: &str = "http://169.254.170.2";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// Set for temporary credentials
    pub expiration: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expiration: None,
        }
    }

    pub fn with_expiration(mut self, expiration: Option<DateTime<Utc>>) -> Self {
        self.expiration = expiration;
        self
    }

    /// Whether the credentials stop being valid less than `margin` after `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        self.expiration
            .is_some_and(|expiration| expiration - margin <= now)
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// Resolves the credentials of one account. Called when a session group is created and again
/// whenever its credentials are about to expire or were rejected, so implementations may do
/// network I/O.
#[async_trait::async_trait]
pub trait CredentialsResolver: Send + Sync {
    async fn resolve(&self, account: &Account) -> Result<Credentials, String>;
}

/// Location of a container credentials endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEndpoint {
    pub url: String,
    pub authorization_token: Option<String>,
}

impl ContainerEndpoint {
    pub fn from_env() -> Option<Self> {
        let url = env::var(ENV_CONTAINER_FULL_URI).ok().or_else(|| {
            env::var(ENV_CONTAINER_RELATIVE_URI)
                .ok()
                .map(|relative| format!("{CONTAINER_CREDENTIALS_HOST}{relative}"))
        })?;
        Some(Self {
            url,
            authorization_token: env::var(ENV_CONTAINER_AUTH_TOKEN).ok(),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerCredentials {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    token: Option<String>,
    /// RFC 3339
    #[serde(default)]
    expiration: Option<String>,
}

fn parse_expiration(expiration: Option<&str>) -> Option<DateTime<Utc>> {
    let expiration = expiration?;
    match DateTime::parse_from_rfc3339(expiration) {
        Ok(expiration) => Some(expiration.with_timezone(&Utc)),
        Err(e) => {
            warn!("Ignoring unparsable credentials expiration {expiration:?}: {e}");
            None
        }
    }
}

/// Static keys, then environment, then container endpoint.
pub struct DefaultCredentialsResolver {
    client: reqwest::Client,
    container: Option<ContainerEndpoint>,
}

impl DefaultCredentialsResolver {
    /// Picks up the container endpoint from the environment.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            container: ContainerEndpoint::from_env(),
        }
    }

    pub fn with_container_endpoint(client: reqwest::Client, container: ContainerEndpoint) -> Self {
        Self {
            client,
            container: Some(container),
        }
    }

    fn from_environment() -> Option<Credentials> {
        let access_key_id = env::var(ENV_ACCESS_KEY_ID).ok()?;
        let secret_access_key = env::var(ENV_SECRET_ACCESS_KEY).ok()?;
        if access_key_id.is_empty() || secret_access_key.is_empty() {
            return None;
        }
        Some(Credentials::new(
            access_key_id,
            secret_access_key,
            env::var(ENV_SESSION_TOKEN).ok().filter(|t| !t.is_empty()),
        ))
    }

    async fn from_container(&self, endpoint: &ContainerEndpoint) -> Result<Credentials, String> {
        let mut request = self.client.get(&endpoint.url);
        if let Some(token) = &endpoint.authorization_token {
            request = request.header("Authorization", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("container credentials endpoint unreachable: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!(
                "container credentials endpoint returned {status}: {}",
                response.text().await.unwrap_or_default()
            ));
        }

        let creds: ContainerCredentials = response
            .json()
            .await
            .map_err(|e| format!("invalid container credentials response: {e}"))?;
        let expiration = parse_expiration(creds.expiration.as_deref());
        Ok(
            Credentials::new(creds.access_key_id, creds.secret_access_key, creds.token)
                .with_expiration(expiration),
        )
    }
}

#[async_trait::async_trait]
impl CredentialsResolver for DefaultCredentialsResolver {
    async fn resolve(&self, account: &Account) -> Result<Credentials, String> {
        match account {
            Account::Static {
                access_key_id,
                secret_access_key,
            } => Ok(Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
            )),
            Account::Default => {
                if let Some(creds) = Self::from_environment() {
                    debug!("Resolved default credentials from environment");
                    return Ok(creds);
                }
                match &self.container {
                    Some(endpoint) => {
                        let creds = self.from_container(endpoint).await?;
                        debug!("Resolved default credentials from {}", endpoint.url);
                        Ok(creds)
                    }
                    None => Err("no credentials found in environment or container endpoint"
                        .to_string()),
                }
            }
        }
    }
}

impl Debug for DefaultCredentialsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DefaultCredentialsResolver")
    }
}
