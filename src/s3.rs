//! Amazon S3 client for capture images and the history mirror.
//!
//! Talks to the S3 REST API directly with AWS Signature V4 authentication
//! (`hmac` + `sha2`, no C dependencies). One [`S3Client`] serves two roles:
//!
//! - [`ImageFetcher`]: download a capture image by key (under the
//!   configured prefix);
//! - [`HistoryMirror`]: upload the history file after every commit and
//!   download it when a host starts without a local copy.
//!
//! # Configuration
//!
//! ```toml
//! [mirror]
//! bucket = "greenhouse"
//! region = "eu-west-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO, path-style
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials / IAM roles)

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};

use crate::config::S3Config;
use crate::traits::{HistoryMirror, ImageFetcher};

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
#[derive(Clone)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: String, secret_access_key: String, session_token: Option<String>) -> Self {
        Self {
            access_key_id,
            secret_access_key,
            session_token,
        }
    }

    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self::new(access_key_id, secret_access_key, session_token))
    }
}

/// Signed access to one bucket.
pub struct S3Client {
    config: S3Config,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3Client {
    pub fn new(config: S3Config, creds: AwsCredentials) -> Self {
        Self {
            config,
            creds,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env(config: S3Config) -> Result<Self> {
        Ok(Self::new(config, AwsCredentials::from_env()?))
    }

    /// Full object key for `key` under the configured prefix.
    fn object_key(&self, key: &str) -> String {
        let prefix = self.config.prefix.trim_end_matches('/');
        if prefix.is_empty() || key.starts_with(&format!("{}/", prefix)) {
            key.to_string()
        } else {
            format!("{}/{}", prefix, key.trim_start_matches('/'))
        }
    }

    /// Download an object; `None` when it does not exist.
    pub async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let req = self.signed_request(reqwest::Method::GET, key, &[], Utc::now());
        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", self.config.bucket, key))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            bail!("S3 GetObject failed (HTTP {}) for key '{}'", resp.status(), key);
        }
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    /// Upload an object, replacing any existing one.
    pub async fn put_object(&self, key: &str, body: &[u8], content_type: &str) -> Result<()> {
        let req = self
            .signed_request(reqwest::Method::PUT, key, body, Utc::now())
            .header("Content-Type", content_type)
            .body(body.to_vec());

        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to put s3://{}/{}", self.config.bucket, key))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                text.chars().take(500).collect::<String>()
            );
        }
        Ok(())
    }

    /// Build a SigV4-signed request for `key` with the given payload.
    fn signed_request(
        &self,
        method: reqwest::Method,
        key: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> reqwest::RequestBuilder {
        let endpoint = s3_endpoint(&self.config);
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("{}/{}", endpoint.path_prefix, encoded_key);
        let url = format!("{}://{}{}", endpoint.scheme, endpoint.host, canonical_uri);

        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(payload);

        let mut headers = vec![
            ("host".to_string(), endpoint.host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut req_builder = self
            .client
            .request(method, &url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);

        if let Some(ref token) = self.creds.session_token {
            req_builder = req_builder.header("x-amz-security-token", token);
        }
        req_builder
    }
}

#[async_trait]
impl ImageFetcher for S3Client {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let object_key = self.object_key(key);
        match self.get_object(&object_key).await? {
            Some(bytes) => Ok(bytes),
            None => bail!("s3://{}/{} does not exist", self.config.bucket, object_key),
        }
    }
}

#[async_trait]
impl HistoryMirror for S3Client {
    async fn persist(&self, blob: &[u8], key: &str) -> Result<()> {
        self.put_object(&self.object_key(key), blob, "application/json")
            .await
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_object(&self.object_key(key)).await
    }
}

// ============ AWS SigV4 Helpers ============

/// Where requests for a bucket are sent.
struct S3Endpoint {
    scheme: &'static str,
    host: String,
    /// `/<bucket>` for path-style custom endpoints, empty for virtual-hosted AWS.
    path_prefix: String,
}

/// Resolve the endpoint for the configured bucket and region.
///
/// A custom `endpoint_url` (MinIO, LocalStack) is addressed path-style and
/// keeps its own scheme; otherwise the virtual-hosted
/// `<bucket>.s3.<region>.amazonaws.com` over HTTPS is used.
fn s3_endpoint(config: &S3Config) -> S3Endpoint {
    if let Some(ref endpoint) = config.endpoint_url {
        let scheme = if endpoint.starts_with("http://") {
            "http"
        } else {
            "https"
        };
        let host = endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        S3Endpoint {
            scheme,
            host,
            path_prefix: format!("/{}", uri_encode(&config.bucket)),
        }
    } else {
        S3Endpoint {
            scheme: "https",
            host: format!("{}.s3.{}.amazonaws.com", config.bucket, config.region),
            path_prefix: String::new(),
        }
    }
}

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute hex-encoded HMAC-SHA256.
fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}
