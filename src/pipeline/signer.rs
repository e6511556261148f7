//! SigV4-style request signer
//!
//! Signs every header present on the wire request at signing time. Headers
//! added by later handlers are therefore outside the signature, which is
//! where trace headers belong: they may be rewritten by proxies without
//! invalidating the request.

use super::{ExecutionContext, Next, PipelineError, PipelineHandler, WireRequest, WireResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hyper::header::{HeaderValue, AUTHORIZATION};
use sha2::{Digest, Sha256};

/// Name of the signer handler
pub const SIGNER: &str = "Signer";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const AMZ_DATE: &str = "x-amz-date";
const AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| PipelineError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Header names listed in an `Authorization` value's `SignedHeaders`
pub fn parse_signed_headers(authorization: &str) -> Vec<&str> {
    authorization
        .split(", ")
        .find_map(|part| part.strip_prefix("SignedHeaders="))
        .map(|names| names.split(';').collect())
        .unwrap_or_default()
}

/// HMAC-SHA256 signer using static credentials
#[derive(Clone)]
pub struct HmacSigner {
    access_key: String,
    secret_key: String,
    region: String,
    service: String,
}

impl HmacSigner {
    pub fn new(access_key: &str, secret_key: &str, region: &str, service: &str) -> Self {
        Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            region: region.to_string(),
            service: service.to_string(),
        }
    }

    /// Sign `wire` in place as of `now`
    pub fn sign(&self, wire: &mut WireRequest, now: DateTime<Utc>) -> Result<(), PipelineError> {
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = sha256_hex(&wire.body);

        wire.headers.insert(
            AMZ_DATE,
            HeaderValue::from_str(&timestamp).map_err(|e| PipelineError::Signing(e.to_string()))?,
        );
        wire.headers.insert(
            AMZ_CONTENT_SHA256,
            HeaderValue::from_str(&payload_hash)
                .map_err(|e| PipelineError::Signing(e.to_string()))?,
        );
        wire.headers.remove(AUTHORIZATION);

        // Canonical headers: lowercase names, sorted, trimmed values
        let mut names: Vec<&str> = wire.headers.keys().map(|name| name.as_str()).collect();
        names.sort_unstable();
        names.dedup();

        let canonical_headers: String = names
            .iter()
            .map(|name| {
                let values: Vec<String> = wire
                    .headers
                    .get_all(*name)
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_string())
                    .collect();
                format!("{}:{}\n", name, values.join(","))
            })
            .collect();
        let signed_headers = names.join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            wire.method,
            wire.uri.path(),
            wire.uri.query().unwrap_or_default(),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/{}/aws4_request", date, self.region, self.service);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            timestamp,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        // kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, credential_scope, signed_headers, signature
        );
        wire.headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization)
                .map_err(|e| PipelineError::Signing(e.to_string()))?,
        );

        Ok(())
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineHandler for HmacSigner {
    fn name(&self) -> &'static str {
        SIGNER
    }

    async fn invoke(
        &self,
        cx: &mut ExecutionContext,
        next: Next<'_>,
    ) -> Result<WireResponse, PipelineError> {
        let wire = cx.wire.as_mut().ok_or(PipelineError::NotMarshalled(SIGNER))?;
        self.sign(wire, Utc::now())?;
        next.run(cx).await
    }
}
