//! Amazon S3 object store.
//!
//! Stores thumbnails in an S3 bucket through the S3 REST API with AWS
//! Signature V4 authentication. Supports custom endpoints for S3-compatible
//! services (MinIO, LocalStack), which are addressed path-style.
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for AWS signing, with
//! no C library dependencies like `aws-lc-sys`.
//!
//! # Configuration
//!
//! ```toml
//! [object_store]
//! bucket = "book-covers"
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional, for temporary credentials
//!
//! # Operations
//!
//! | Trait method | S3 call |
//! |--------------|---------|
//! | `put` | `PutObject` |
//! | `delete` | `DeleteObject` per key |
//! | `delete_all` | `ListObjectsV2` (paginated) + `DeleteObject` per key |

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Method, Url};
use sha2::{Digest, Sha256};

use crate::config::ObjectStoreConfig;
use crate::traits::ObjectStore;

type HmacSha256 = Hmac<Sha256>;

// ============ AWS Credentials ============

/// AWS credentials used to sign requests.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ Object store ============

/// [`ObjectStore`] backed by one S3 bucket.
pub struct S3ObjectStore {
    client: reqwest::Client,
    config: ObjectStoreConfig,
    creds: AwsCredentials,
    endpoint: Endpoint,
}

/// Where requests go: scheme + host, and the path prefix that precedes the
/// object key (`/<bucket>` for path-style addressing, empty otherwise).
struct Endpoint {
    base: String,
    host: String,
    path_prefix: String,
}

impl S3ObjectStore {
    /// Create a store with credentials read from the environment.
    pub fn new(config: ObjectStoreConfig) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        Self::with_credentials(config, creds)
    }

    pub fn with_credentials(config: ObjectStoreConfig, creds: AwsCredentials) -> Result<Self> {
        let endpoint = endpoint(&config)?;
        Ok(Self {
            client: reqwest::Client::new(),
            config,
            creds,
            endpoint,
        })
    }

    fn object_path(&self, key: &str) -> String {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        format!("{}/{}", self.endpoint.path_prefix, encoded_key)
    }

    /// Build, sign and send one request.
    async fn send(
        &self,
        method: Method,
        canonical_uri: &str,
        query: &[(String, String)],
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response> {
        let canonical_querystring = canonical_query(query);
        let payload_hash = hex_sha256(&body);
        let headers = sign(
            &self.creds,
            &self.config.region,
            &self.endpoint.host,
            method.as_str(),
            canonical_uri,
            &canonical_querystring,
            &payload_hash,
            Utc::now(),
        )?;

        let url = if canonical_querystring.is_empty() {
            format!("{}{}", self.endpoint.base, canonical_uri)
        } else {
            format!(
                "{}{}?{}",
                self.endpoint.base, canonical_uri, canonical_querystring
            )
        };

        let mut req = self.client.request(method, &url);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        if let Some(ct) = content_type {
            req = req.header("Content-Type", ct);
        }
        if !body.is_empty() {
            req = req.body(body);
        }

        req.send()
            .await
            .map_err(|e| anyhow!("S3 request to s3://{} failed: {}", self.config.bucket, e))
    }

    async fn delete_key(&self, key: &str) -> Result<()> {
        let path = self.object_path(key);
        let resp = self.send(Method::DELETE, &path, &[], Vec::new(), None).await?;
        expect_success(resp, "DeleteObject", Some(key)).await?;
        Ok(())
    }

    /// List every key under `prefix`, following continuation tokens.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;
        let bucket_path = format!("{}/", self.endpoint.path_prefix);

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !prefix.is_empty() {
                query.push(("prefix".to_string(), prefix.to_string()));
            }
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self
                .send(Method::GET, &bucket_path, &query, Vec::new(), None)
                .await?;

            let xml_body = expect_success(resp, "ListObjectsV2", None)
                .await?
                .text()
                .await?;
            let page = parse_list_objects_response(&xml_body);
            keys.extend(page.keys);

            match (page.is_truncated, page.next_token) {
                (true, Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> Result<()> {
        let path = self.object_path(key);
        let resp = self
            .send(Method::PUT, &path, &[], bytes, content_type)
            .await?;
        expect_success(resp, "PutObject", Some(key)).await?;
        tracing::debug!(bucket = %self.config.bucket, key, "object stored");
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        for key in keys {
            self.delete_key(key).await?;
        }
        Ok(keys.len())
    }

    async fn delete_all(&self, prefix: &str) -> Result<usize> {
        let keys = self.list_keys(prefix).await?;
        tracing::info!(
            bucket = %self.config.bucket,
            prefix,
            objects = keys.len(),
            "deleting objects"
        );
        self.delete(&keys).await
    }
}

/// Pass a 2xx response through; turn anything else into an error carrying
/// the start of the S3 error body.
async fn expect_success(
    resp: reqwest::Response,
    operation: &str,
    key: Option<&str>,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: String = resp
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(500)
        .collect();
    match key {
        Some(key) => bail!(
            "S3 {} failed (HTTP {}) for key '{}': {}",
            operation,
            status,
            key,
            body
        ),
        None => bail!("S3 {} failed (HTTP {}): {}", operation, status, body),
    }
}

// ============ AWS SigV4 Helpers ============

/// Resolve the request endpoint for the configured bucket.
///
/// A custom `endpoint_url` keeps its scheme and port and uses path-style
/// addressing; otherwise the standard virtual-hosted
/// `<bucket>.s3.<region>.amazonaws.com` is used.
fn endpoint(config: &ObjectStoreConfig) -> Result<Endpoint> {
    match &config.endpoint_url {
        Some(raw) => {
            let url = Url::parse(raw)
                .with_context(|| format!("Invalid object_store.endpoint_url: {}", raw))?;
            let host_name = url
                .host_str()
                .ok_or_else(|| anyhow!("object_store.endpoint_url has no host: {}", raw))?;
            let host = match url.port() {
                Some(port) => format!("{}:{}", host_name, port),
                None => host_name.to_string(),
            };
            Ok(Endpoint {
                base: format!("{}://{}", url.scheme(), host),
                host,
                path_prefix: format!("/{}", uri_encode(&config.bucket)),
            })
        }
        None => {
            let host = format!("{}.s3.{}.amazonaws.com", config.bucket, config.region);
            Ok(Endpoint {
                base: format!("https://{}", host),
                host,
                path_prefix: String::new(),
            })
        }
    }
}

/// Sorted, URI-encoded query string.
fn canonical_query(params: &[(String, String)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compute the SigV4 headers for one request.
///
/// Returns the headers to attach (`Authorization`, `x-amz-date`,
/// `x-amz-content-sha256`, and `x-amz-security-token` when a session token
/// is present).
#[allow(clippy::too_many_arguments)]
fn sign(
    creds: &AwsCredentials,
    region: &str,
    host: &str,
    method: &str,
    canonical_uri: &str,
    canonical_querystring: &str,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> Result<Vec<(String, String)>> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut headers = vec![
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
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
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri,
        canonical_querystring,
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3")?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    );

    // `host` is set by the HTTP client itself.
    let mut out: Vec<(String, String)> = headers.into_iter().filter(|(k, _)| k != "host").collect();
    out.push(("Authorization".to_string(), authorization));
    Ok(out)
}

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| anyhow!("invalid HMAC key: {}", e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    )?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986. Leaves `A-Z a-z 0-9 - _ . ~`.
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

// ============ XML Parsing (minimal, no extra deps) ============

/// One page of a `ListObjectsV2` response.
struct ListPage {
    keys: Vec<String>,
    is_truncated: bool,
    next_token: Option<String>,
}

fn parse_list_objects_response(xml: &str) -> ListPage {
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut keys = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        if let Some(key) = extract_xml_value(block, "Key").filter(|k| !k.is_empty()) {
            keys.push(xml_unescape(&key));
        }
        remaining = &remaining[block_start + end + "</Contents>".len()..];
    }

    ListPage {
        keys,
        is_truncated,
        next_token,
    }
}

/// Extract the text content of an XML tag (simple, non-nested).
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_key_matches_aws_example() {
        let key = derive_signing_key(
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
    fn test_uri_encode() {
        assert_eq!(uri_encode("thumbnails"), "thumbnails");
        assert_eq!(uri_encode("a b/c"), "a%20b%2Fc");
        assert_eq!(uri_encode("~x-y_z."), "~x-y_z.");
    }

    #[test]
    fn test_custom_endpoint_is_path_style() {
        let config = ObjectStoreConfig {
            bucket: "covers".into(),
            region: "us-east-1".into(),
            endpoint_url: Some("http://localhost:9000/".into()),
        };
        let ep = endpoint(&config).unwrap();
        assert_eq!(ep.base, "http://localhost:9000");
        assert_eq!(ep.host, "localhost:9000");
        assert_eq!(ep.path_prefix, "/covers");
    }

    #[test]
    fn test_default_endpoint_is_virtual_hosted() {
        let config = ObjectStoreConfig {
            bucket: "covers".into(),
            region: "eu-west-1".into(),
            endpoint_url: None,
        };
        let ep = endpoint(&config).unwrap();
        assert_eq!(ep.base, "https://covers.s3.eu-west-1.amazonaws.com");
        assert_eq!(ep.path_prefix, "");
    }

    #[test]
    fn test_parse_list_page() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <IsTruncated>true</IsTruncated>
  <Contents><Key>thumbnails/9780000000001</Key><Size>10</Size></Contents>
  <Contents><Key>thumbnails/a&amp;b</Key><Size>12</Size></Contents>
  <NextContinuationToken>tok-2</NextContinuationToken>
</ListBucketResult>"#;
        let page = parse_list_objects_response(xml);
        assert_eq!(
            page.keys,
            vec!["thumbnails/9780000000001".to_string(), "thumbnails/a&b".to_string()]
        );
        assert!(page.is_truncated);
        assert_eq!(page.next_token.as_deref(), Some("tok-2"));
    }

    #[test]
    fn test_sign_includes_session_token() {
        let creds = AwsCredentials {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: Some("tok".into()),
        };
        let now = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let headers = sign(
            &creds,
            "us-east-1",
            "localhost:9000",
            "PUT",
            "/covers/thumbnails/x",
            "",
            &hex_sha256(b"abc"),
            now,
        )
        .unwrap();
        let auth = &headers.iter().find(|(k, _)| k == "Authorization").unwrap().1;
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKID/20240102/us-east-1/s3/aws4_request"));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-security-token"));
        assert!(headers.iter().any(|(k, v)| k == "x-amz-date" && v == "20240102T030405Z"));
        assert!(!headers.iter().any(|(k, _)| k == "host"));
    }
}
