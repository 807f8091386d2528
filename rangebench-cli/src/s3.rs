//! An [`ObjectStorage`] for S3 and S3-compatible endpoints.
//!
//! Requests are signed with AWS Signature Version 4 when credentials are available, and sent
//! unsigned otherwise. Without a custom endpoint, objects are addressed virtual-hosted style on
//! the regional AWS endpoint. A custom endpoint uses path-style addressing, which is what most
//! S3-compatible services expect.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt};
use hmac::{Hmac, Mac};
use rangebench_core::{ByteRange, ObjectRef, ObjectStorage, RangeStream, StorageError};
use reqwest::{Method, StatusCode, Url, header};
use secrecy::{ExposeSecret, SecretBox};
use sha2::{Digest, Sha256};

use crate::config::{ConfigSecret, Storage};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "s3";

/// Credentials for signing requests.
#[derive(Debug)]
struct Credentials {
    access_key_id: String,
    secret_access_key: SecretBox<ConfigSecret>,
    session_token: Option<SecretBox<ConfigSecret>>,
}

impl Credentials {
    /// Takes credentials from the configuration, or from the standard AWS environment variables.
    fn resolve(config: &Storage) -> Option<Self> {
        let access_key_id = config
            .access_key
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())?;

        let secret_access_key = match &config.secret_key {
            Some(secret) => secret.clone(),
            None => secret_from_env("AWS_SECRET_ACCESS_KEY")?,
        };

        let session_token = match &config.session_token {
            Some(token) => Some(token.clone()),
            None => secret_from_env("AWS_SESSION_TOKEN"),
        };

        Some(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

fn secret_from_env(name: &str) -> Option<SecretBox<ConfigSecret>> {
    let value = std::env::var(name).ok()?;
    Some(SecretBox::new(Box::new(ConfigSecret::from(value))))
}

/// Where requests for a bucket are sent.
#[derive(Debug)]
enum Addressing {
    /// `https://{bucket}.s3.{region}.amazonaws.com/{key}`
    VirtualHosted,
    /// `{endpoint}/{bucket}/{key}`
    PathStyle(Url),
}

/// A resolved request target.
#[derive(Debug)]
struct Target {
    url: Url,
    host: String,
    canonical_uri: String,
}

/// Storage client for S3 and S3-compatible endpoints.
#[derive(Debug)]
pub struct S3Storage {
    client: reqwest::Client,
    addressing: Addressing,
    region: String,
    credentials: Option<Credentials>,
}

impl S3Storage {
    /// Creates a client for the given storage configuration and bucket region.
    pub fn new(config: &Storage, region: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let addressing = match &config.endpoint {
            Some(endpoint) => {
                let url = Url::parse(endpoint)?;
                anyhow::ensure!(url.has_host(), "storage endpoint {endpoint} has no host");
                Addressing::PathStyle(url)
            }
            None => Addressing::VirtualHosted,
        };

        let credentials = Credentials::resolve(config);
        if credentials.is_none() {
            tracing::warn!("no credentials configured, sending unsigned requests");
        }

        Ok(Self {
            client,
            addressing,
            region,
            credentials,
        })
    }

    /// Uploads an object in a single request.
    #[tracing::instrument(level = "trace", skip(self, body), fields(size = body.len()))]
    pub async fn put(&self, object: &ObjectRef, body: Bytes) -> Result<(), StorageError> {
        let payload_hash = sha256_hex(&body);
        let mut headers = BTreeMap::new();
        headers.insert("content-length".to_owned(), body.len().to_string());

        let response = self
            .request(Method::PUT, object, headers, &payload_hash)?
            .body(body)
            .send()
            .await
            .map_err(|cause| StorageError::request(format!("failed to upload {object}"), cause))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                status: status.as_u16(),
                context: format!("upload of {object} rejected"),
            });
        }

        Ok(())
    }

    fn target(&self, object: &ObjectRef) -> Result<Target, StorageError> {
        let key = pct_encode_path(&object.key);

        let url = match &self.addressing {
            Addressing::VirtualHosted => {
                let host = s3_host(&object.bucket, &self.region);
                format!("https://{host}/{key}")
            }
            Addressing::PathStyle(endpoint) => {
                let base = endpoint.as_str().trim_end_matches('/');
                format!("{base}/{}/{key}", pct_encode(&object.bucket))
            }
        };

        let url = Url::parse(&url)
            .map_err(|cause| StorageError::request(format!("invalid url for {object}"), cause))?;
        // the signed path must include any base path of the endpoint
        let canonical_uri = url.path().to_owned();
        let host = url.host_str().unwrap_or_default();
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };

        Ok(Target {
            url,
            host,
            canonical_uri,
        })
    }

    /// Builds a request, signing it if credentials are available.
    fn request(
        &self,
        method: Method,
        object: &ObjectRef,
        mut headers: BTreeMap<String, String>,
        payload_hash: &str,
    ) -> Result<reqwest::RequestBuilder, StorageError> {
        let target = self.target(object)?;
        let mut builder = self.client.request(method.clone(), target.url);

        if let Some(credentials) = &self.credentials {
            let authorization = sign_headers(
                credentials,
                &self.region,
                method.as_str(),
                &target.host,
                &target.canonical_uri,
                &mut headers,
                payload_hash,
                Utc::now(),
            );
            builder = builder.header(header::AUTHORIZATION, authorization);
        }

        for (name, value) in headers {
            // reqwest derives the host header from the url
            if name != "host" {
                builder = builder.header(name, value);
            }
        }

        Ok(builder)
    }
}

#[async_trait::async_trait]
impl ObjectStorage for S3Storage {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn head(&self, object: &ObjectRef) -> Result<u64, StorageError> {
        let response = self
            .request(Method::HEAD, object, BTreeMap::new(), &sha256_hex(b""))?
            .send()
            .await
            .map_err(|cause| StorageError::request(format!("failed to head {object}"), cause))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(StorageError::NotFound(object.to_string())),
            status if !status.is_success() => {
                return Err(StorageError::Status {
                    status: status.as_u16(),
                    context: format!("head of {object} rejected"),
                });
            }
            _ => (),
        }

        // the body of a HEAD response is empty, so only the header carries the size
        response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| StorageError::Status {
                status: response.status().as_u16(),
                context: format!("head of {object} returned no content length"),
            })
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get_range(
        &self,
        object: &ObjectRef,
        range: ByteRange,
    ) -> Result<RangeStream, StorageError> {
        let mut headers = BTreeMap::new();
        headers.insert("range".to_owned(), range.to_http_header());

        let response = self
            .request(Method::GET, object, headers, &sha256_hex(b""))?
            .send()
            .await
            .map_err(|cause| {
                StorageError::request(format!("failed to read {range} of {object}"), cause)
            })?;

        // anything but a partial response means the endpoint ignored or rejected the range
        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT {
            return Err(StorageError::Status {
                status: status.as_u16(),
                context: format!("read of {range} from {object} not answered with 206"),
            });
        }

        let stream = response
            .bytes_stream()
            .map_err(|cause| StorageError::request("failed to read response body", cause));
        Ok(stream.boxed())
    }
}

fn s3_host(bucket: &str, region: &str) -> String {
    if region == "us-east-1" {
        format!("{bucket}.s3.amazonaws.com")
    } else {
        format!("{bucket}.s3.{region}.amazonaws.com")
    }
}

fn amz_dates(now: DateTime<Utc>) -> (String, String) {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    (amz_date, date_stamp)
}

fn sha256_hex(data: &[u8]) -> String {
    hex_lower(&Sha256::digest(data))
}

fn hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret: &str, date: &str, region: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn is_unreserved(c: u8) -> bool {
    matches!(c, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~')
}

fn pct_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn pct_encode_path(path: &str) -> String {
    path.split('/').map(pct_encode).collect::<Vec<_>>().join("/")
}

/// Adds the signing headers to `headers` and returns the `Authorization` header value.
#[allow(clippy::too_many_arguments)]
fn sign_headers(
    credentials: &Credentials,
    region: &str,
    method: &str,
    host: &str,
    canonical_uri: &str,
    headers: &mut BTreeMap<String, String>,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> String {
    let (amz_date, date_stamp) = amz_dates(now);
    headers.insert("host".to_owned(), host.to_owned());
    headers.insert("x-amz-date".to_owned(), amz_date.clone());
    headers.insert("x-amz-content-sha256".to_owned(), payload_hash.to_owned());
    if let Some(token) = &credentials.session_token {
        headers.insert(
            "x-amz-security-token".to_owned(),
            token.expose_secret().as_str().to_owned(),
        );
    }

    // keys are lowercase and the map keeps them sorted
    let mut canonical_headers = String::new();
    for (name, value) in headers.iter() {
        canonical_headers.push_str(&format!("{name}:{}\n", value.trim()));
    }
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical_request = format!(
        "{method}\n{canonical_uri}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );
    let credential_scope = format!("{date_stamp}/{region}/{SERVICE}/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let secret = credentials.secret_access_key.expose_secret();
    let key = signing_key(secret.as_str(), &date_stamp, region);
    let signature = hex_lower(&hmac_sha256(&key, string_to_sign.as_bytes()));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.access_key_id
    )
}
