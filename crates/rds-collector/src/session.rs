// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Authenticated API sessions, one per (account, region) pair.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::cloudwatch::{self, GetMetricDataRequest, GetMetricDataResponse};
use crate::config::{Account, Instance, SessionKey};
use crate::credentials::{Credentials, CredentialsResolver};
use crate::errors::CollectError;
use crate::logs::{self, GetLogEventsRequest, GetLogEventsResponse};
use crate::signing::{self, SignableRequest};
use crate::stats::{Api, ExporterStats};

/// `__type` codes that mean the credentials were rejected.
const AUTH_ERROR_CODES: &[&str] = &[
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "ExpiredTokenException",
    "AccessDeniedException",
    "IncompleteSignature",
    "InvalidClientTokenId",
];

/// Temporary credentials are re-resolved this long before they expire.
const REFRESH_MARGIN: TimeDelta = TimeDelta::minutes(5);

/// HTTP plumbing shared by every session. Built by the caller and injected.
#[derive(Debug)]
pub struct Transport {
    pub client: reqwest::Client,
    /// Replaces `https://{service}.{region}.amazonaws.com` for every service when set
    pub endpoint_override: Option<String>,
    /// Logs every signed request at trace level, credentials included
    pub trace_requests: bool,
    pub stats: Arc<ExporterStats>,
}

impl Transport {
    pub fn new(client: reqwest::Client, stats: Arc<ExporterStats>) -> Self {
        Self {
            client,
            endpoint_override: None,
            trace_requests: false,
            stats,
        }
    }

    fn endpoint(&self, service: &str, region: &str) -> String {
        match &self.endpoint_override {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{service}.{region}.amazonaws.com"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

impl ApiErrorBody {
    /// `com.amazonaws.coral.service#ExpiredTokenException` -> `ExpiredTokenException`
    fn code(&self) -> String {
        self.error_type
            .as_deref()
            .map(|t| t.rsplit('#').next().unwrap_or(t))
            .unwrap_or("Unknown")
            .to_string()
    }
}

struct Call<'a> {
    api: Api,
    service: &'static str,
    target: &'static str,
    content_type: &'static str,
    instance: &'a str,
}

struct Refresh {
    account: Account,
    resolver: Arc<dyn CredentialsResolver>,
}

/// Authenticated handle to one (account, region). The handle itself is never replaced; only its
/// credentials are, when they are about to expire or were rejected upstream.
pub struct Session {
    key: SessionKey,
    credentials: RwLock<Credentials>,
    refresh: Option<Refresh>,
    /// Set after an auth-class error so the next call re-resolves
    stale: AtomicBool,
    transport: Arc<Transport>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("refreshable", &self.refresh.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A session whose credentials are used as-is for its whole lifetime.
    pub fn new(key: SessionKey, credentials: Credentials, transport: Arc<Transport>) -> Self {
        Self {
            key,
            credentials: RwLock::new(credentials),
            refresh: None,
            stale: AtomicBool::new(false),
            transport,
        }
    }

    /// A session that goes back to `resolver` for `account` when its credentials near expiry or
    /// get rejected.
    pub fn refreshable(
        key: SessionKey,
        account: Account,
        credentials: Credentials,
        resolver: Arc<dyn CredentialsResolver>,
        transport: Arc<Transport>,
    ) -> Self {
        Self {
            refresh: Some(Refresh { account, resolver }),
            ..Self::new(key, credentials, transport)
        }
    }

    pub fn region(&self) -> &str {
        &self.key.region
    }

    fn needs_refresh(&self, credentials: &Credentials) -> bool {
        self.refresh.is_some()
            && (self.stale.load(Ordering::SeqCst)
                || credentials.expires_within(Utc::now(), REFRESH_MARGIN))
    }

    /// Current credentials, re-resolved first when they are stale. Concurrent callers wait on a
    /// single resolution.
    async fn credentials(&self) -> Result<Credentials, CollectError> {
        {
            let current = self.credentials.read().await;
            if !self.needs_refresh(&current) {
                return Ok(current.clone());
            }
        }
        let Some(refresh) = &self.refresh else {
            return Ok(self.credentials.read().await.clone());
        };

        let mut current = self.credentials.write().await;
        if !self.needs_refresh(&current) {
            return Ok(current.clone());
        }
        let fresh = refresh
            .resolver
            .resolve(&refresh.account)
            .await
            .map_err(|reason| CollectError::AuthFailure {
                account: self.key.account.clone(),
                region: self.key.region.clone(),
                reason,
            })?;
        info!("Refreshed credentials of session {}", self.key);
        *current = fresh.clone();
        self.stale.store(false, Ordering::SeqCst);
        Ok(fresh)
    }

    pub async fn get_metric_data(
        &self,
        instance: &str,
        request: &GetMetricDataRequest,
    ) -> Result<GetMetricDataResponse, CollectError> {
        self.call(
            Call {
                api: Api::GetMetricData,
                service: cloudwatch::SERVICE,
                target: cloudwatch::TARGET,
                content_type: cloudwatch::CONTENT_TYPE,
                instance,
            },
            request,
        )
        .await
    }

    pub async fn get_log_events(
        &self,
        instance: &str,
        request: &GetLogEventsRequest,
    ) -> Result<GetLogEventsResponse, CollectError> {
        self.call(
            Call {
                api: Api::GetLogEvents,
                service: logs::SERVICE,
                target: logs::TARGET,
                content_type: logs::CONTENT_TYPE,
                instance,
            },
            request,
        )
        .await
    }

    async fn call<Req, Resp>(&self, call: Call<'_>, request: &Req) -> Result<Resp, CollectError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let transport = &self.transport;
        let url = transport.endpoint(call.service, self.region());
        let parsed = reqwest::Url::parse(&url)
            .map_err(|e| CollectError::Signing(format!("invalid endpoint {url}: {e}")))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(CollectError::Signing(format!("endpoint {url} has no host"))),
        };

        let credentials = self.credentials().await?;
        let payload = serde_json::to_vec(request)?;
        let signed = signing::sign(
            &credentials,
            &SignableRequest {
                service: call.service,
                region: self.region(),
                host: &host,
                content_type: call.content_type,
                target: call.target,
                payload: &payload,
            },
            Utc::now(),
        )?;

        if transport.trace_requests {
            trace!(
                "{} request for {} to {url}: authorization={} x-amz-date={} security_token={:?} body={}",
                call.api,
                call.instance,
                signed.authorization,
                signed.amz_date,
                signed.security_token,
                String::from_utf8_lossy(&payload)
            );
        }

        let mut builder = transport
            .client
            .post(parsed)
            .header("content-type", call.content_type)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-target", call.target)
            .header("authorization", &signed.authorization);
        if let Some(token) = &signed.security_token {
            builder = builder.header("x-amz-security-token", token);
        }

        transport.stats.record_request(call.api);
        let response = match builder.body(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                transport.stats.record_request_error(call.api);
                return Err(CollectError::Network(e));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                transport.stats.record_request_error(call.api);
                return Err(CollectError::Network(e));
            }
        };
        if transport.trace_requests {
            trace!("{} response for {}: status={status} body={body}", call.api, call.instance);
        }

        if !status.is_success() {
            transport.stats.record_request_error(call.api);
            let error_body: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let code = error_body.code();
            let message = error_body.message.unwrap_or(body);
            if status.as_u16() == 401
                || status.as_u16() == 403
                || AUTH_ERROR_CODES.contains(&code.as_str())
            {
                if self.refresh.is_some() {
                    warn!(
                        "Credentials of session {} were rejected, resolving them again on next use",
                        self.key
                    );
                    self.stale.store(true, Ordering::SeqCst);
                }
                return Err(CollectError::AuthFailure {
                    account: self.key.account.clone(),
                    region: self.key.region.clone(),
                    reason: format!("{code}: {message}"),
                });
            }
            return Err(CollectError::Api {
                service: call.service,
                status: status.as_u16(),
                code,
                message,
            });
        }

        serde_json::from_str(&body).map_err(CollectError::from)
    }
}

/// Looks up the session of an instance. Collectors only see this seam, so tests can swap in
/// fakes.
#[async_trait::async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session(&self, instance: &Instance) -> Result<Arc<Session>, CollectError>;
}

/// Lazily builds and caches sessions. Creation for a key is mutually exclusive: concurrent
/// callers wait on the first one and share its session. A failed creation leaves the key empty
/// so the next round tries again.
pub struct SessionManager {
    transport: Arc<Transport>,
    resolver: Arc<dyn CredentialsResolver>,
    sessions: Mutex<HashMap<SessionKey, Arc<OnceCell<Arc<Session>>>>>,
}

impl SessionManager {
    pub fn new(transport: Arc<Transport>, resolver: Arc<dyn CredentialsResolver>) -> Self {
        Self {
            transport,
            resolver,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, instance: &Instance) -> Result<Arc<Session>, CollectError> {
        let key = instance.session_key();
        let cell = {
            let mut sessions = self.sessions.lock().await;
            sessions.entry(key.clone()).or_default().clone()
        };

        cell.get_or_try_init(|| async {
            let credentials = self
                .resolver
                .resolve(&instance.account())
                .await
                .map_err(|reason| CollectError::AuthFailure {
                    account: key.account.clone(),
                    region: key.region.clone(),
                    reason,
                })?;
            info!("Created session {key}");
            Ok::<_, CollectError>(Arc::new(Session::refreshable(
                key.clone(),
                instance.account(),
                credentials,
                Arc::clone(&self.resolver),
                Arc::clone(&self.transport),
            )))
        })
        .await
        .cloned()
    }

    /// Establishes the session of every (account, region) group up front. Fails only when no
    /// group at all could be established; the others are retried on the next scrape.
    pub async fn warm_up(&self, instances: &[Instance]) -> Result<usize, CollectError> {
        let mut groups: BTreeMap<SessionKey, &Instance> = BTreeMap::new();
        for instance in instances {
            groups.entry(instance.session_key()).or_insert(instance);
        }

        let mut established = 0;
        let mut last_error = None;
        for (key, instance) in &groups {
            match self.get(instance).await {
                Ok(_) => established += 1,
                Err(e) => {
                    warn!("Failed to establish session {key}: {e}");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if established == 0 => {
                error!("No session group could be established");
                Err(e)
            }
            _ => {
                debug!("Established {established} of {} session groups", groups.len());
                Ok(established)
            }
        }
    }

    /// Number of keys with an established session.
    pub async fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}

#[async_trait::async_trait]
impl SessionProvider for SessionManager {
    async fn session(&self, instance: &Instance) -> Result<Arc<Session>, CollectError> {
        self.get(instance).await
    }
}
