// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! AWS Signature Version 4 for the JSON protocol `POST /` requests issued by sessions.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::credentials::Credentials;
use crate::errors::CollectError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// A JSON-protocol request about to be signed.
pub struct SignableRequest<'a> {
    pub service: &'a str,
    pub region: &'a str,
    /// `host[:port]` exactly as it will be sent
    pub host: &'a str,
    pub content_type: &'a str,
    pub target: &'a str,
    pub payload: &'a [u8],
}

/// Headers to attach to the request, authorization included.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
    pub security_token: Option<String>,
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CollectError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| CollectError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derives the signing key for a date (`YYYYMMDD`), region and service.
pub fn signing_key(
    secret_access_key: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, CollectError> {
    let k_date = hmac_sha256(format!("AWS4{secret_access_key}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

pub fn sign(
    credentials: &Credentials,
    request: &SignableRequest<'_>,
    now: DateTime<Utc>,
) -> Result<SignedHeaders, CollectError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    // Header names must be lowercase and sorted.
    let mut headers = vec![
        ("content-type", request.content_type.to_string()),
        ("host", request.host.to_string()),
        ("x-amz-date", amz_date.clone()),
    ];
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token", token.clone()));
    }
    headers.push(("x-amz-target", request.target.to_string()));

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let hashed_payload = hex::encode(Sha256::digest(request.payload));
    let canonical_request =
        format!("POST\n/\n\n{canonical_headers}\n{signed_headers}\n{hashed_payload}");

    let credential_scope = format!(
        "{date}/{}/{}/aws4_request",
        request.region, request.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(
        &credentials.secret_access_key,
        &date,
        request.region,
        request.service,
    )?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        amz_date,
        authorization: format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
        security_token: credentials.session_token.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credentials(token: Option<&str>) -> Credentials {
        Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            token.map(str::to_string),
        )
    }

    fn request(payload: &[u8]) -> SignableRequest<'_> {
        SignableRequest {
            service: "monitoring",
            region: "us-east-1",
            host: "monitoring.us-east-1.amazonaws.com",
            content_type: "application/x-amz-json-1.0",
            target: "GraniteServiceVersion20100801.GetMetricData",
            payload,
        }
    }

    #[test]
    fn test_signing_key_derivation() {
        // Reference values from the AWS Signature Version 4 documentation.
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_authorization_header_shape() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let signed = sign(&credentials(None), &request(b"{}"), now).unwrap();

        assert_eq!(signed.amz_date, "20240301T123000Z");
        assert!(signed.authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240301/us-east-1/monitoring/aws4_request, "
        ));
        assert!(signed
            .authorization
            .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-target, "));
        let signature = signed
            .authorization
            .rsplit("Signature=")
            .next()
            .unwrap_or_default();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn test_session_token_is_signed() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let signed = sign(&credentials(Some("token")), &request(b"{}"), now).unwrap();
        assert!(signed.authorization.contains(
            "SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target"
        ));
        assert_eq!(signed.security_token.as_deref(), Some("token"));
    }

    #[test]
    fn test_signature_depends_on_payload() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let a = sign(&credentials(None), &request(b"{\"a\":1}"), now).unwrap();
        let b = sign(&credentials(None), &request(b"{\"a\":2}"), now).unwrap();
        let again = sign(&credentials(None), &request(b"{\"a\":1}"), now).unwrap();
        assert_ne!(a.authorization, b.authorization);
        assert_eq!(a.authorization, again.authorization);
    }
}
