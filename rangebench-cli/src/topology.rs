//! Host discovery through the EC2 instance metadata service.
//!
//! Off EC2, every metadata lookup times out after a second and the topology falls back to the
//! host name and an unknown instance class. Lookups happen once, on first use.

use std::thread;
use std::time::Duration;

use rangebench_core::{HardwareConcurrency, Topology};
use sysinfo::System;
use tokio::sync::OnceCell;

/// Base URL of the EC2 instance metadata service.
pub const METADATA_URL: &str = "http://169.254.169.254";

const METADATA_TIMEOUT: Duration = Duration::from_secs(1);
const TOKEN_TTL_SECONDS: &str = "60";

#[derive(Debug, Default)]
struct Metadata {
    instance_id: Option<String>,
    instance_type: Option<String>,
    region: Option<String>,
}

/// Discovers the host from EC2 instance metadata, the host name, and the CPU topology.
#[derive(Debug)]
pub struct Ec2Topology {
    client: reqwest::Client,
    base_url: String,
    metadata: OnceCell<Metadata>,
}

impl Ec2Topology {
    /// Creates a topology that queries the given metadata service.
    ///
    /// Fails only if the HTTP client cannot be built, for example when the TLS backend cannot be
    /// initialized. Lookups themselves never fail.
    pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(METADATA_TIMEOUT)
            .connect_timeout(METADATA_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            metadata: OnceCell::new(),
        })
    }

    async fn metadata(&self) -> &Metadata {
        self.metadata
            .get_or_init(|| async {
                let token = self.token().await;
                let token = token.as_deref();

                let (instance_id, instance_type, region) = tokio::join!(
                    self.lookup("instance-id", token),
                    self.lookup("instance-type", token),
                    self.lookup("placement/region", token),
                );

                let metadata = Metadata {
                    instance_id,
                    instance_type,
                    region,
                };
                tracing::debug!(?metadata, "discovered host metadata");
                metadata
            })
            .await
    }

    /// Requests an IMDSv2 session token. Instances accepting IMDSv1 work without one.
    async fn token(&self) -> Option<String> {
        let response = self
            .client
            .put(format!("{}/latest/api/token", self.base_url))
            .header("x-aws-ec2-metadata-token-ttl-seconds", TOKEN_TTL_SECONDS)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok()
    }

    async fn lookup(&self, path: &str, token: Option<&str>) -> Option<String> {
        let mut request = self
            .client
            .get(format!("{}/latest/meta-data/{path}", self.base_url));
        if let Some(token) = token {
            request = request.header("x-aws-ec2-metadata-token", token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(path, %error, "instance metadata unavailable");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(path, status = %response.status(), "instance metadata unavailable");
            return None;
        }

        let value = response.text().await.ok()?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_owned())
    }
}

#[async_trait::async_trait]
impl Topology for Ec2Topology {
    fn hardware_concurrency(&self) -> HardwareConcurrency {
        let threads = thread::available_parallelism().map_or(1, |n| n.get()) as u64;
        let cores = System::physical_core_count().map_or(threads, |n| n as u64);
        HardwareConcurrency { cores, threads }
    }

    async fn instance_class(&self) -> Option<String> {
        self.metadata().await.instance_type.clone()
    }

    async fn host_id(&self) -> String {
        if let Some(id) = &self.metadata().await.instance_id {
            return id.clone();
        }

        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_owned())
    }

    async fn region(&self) -> Option<String> {
        self.metadata().await.region.clone()
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, put};

    use super::*;

    async fn serve(app: Router) -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (url, handle)
    }

    #[tokio::test]
    async fn reads_instance_metadata() {
        let app = Router::new()
            .route("/latest/api/token", put(|| async { "secret-token" }))
            .route(
                "/latest/meta-data/instance-id",
                get(|headers: HeaderMap| async move {
                    match headers.get("x-aws-ec2-metadata-token") {
                        Some(token) if token == "secret-token" => Ok("i-0123456789"),
                        _ => Err(StatusCode::UNAUTHORIZED),
                    }
                }),
            )
            .route(
                "/latest/meta-data/instance-type",
                get(|| async { "c5n.18xlarge\n" }),
            )
            .route(
                "/latest/meta-data/placement/region",
                get(|| async { "us-west-2" }),
            );
        let (url, handle) = serve(app).await;

        let topology = Ec2Topology::new(url).unwrap();
        let host = topology.host_info().await;
        assert_eq!(host.host_id, "i-0123456789");
        assert_eq!(host.instance_class.as_deref(), Some("c5n.18xlarge"));
        assert_eq!(topology.region().await.as_deref(), Some("us-west-2"));

        handle.abort();
    }

    #[tokio::test]
    async fn falls_back_without_metadata() {
        let (url, handle) = serve(Router::new()).await;

        let topology = Ec2Topology::new(url).unwrap();
        let host = topology.host_info().await;
        assert!(!host.host_id.is_empty());
        assert_eq!(host.instance_class, None);
        assert_eq!(host.instance_type(), "unknown-instance");
        assert_eq!(topology.region().await, None);

        handle.abort();
    }

    #[test]
    fn reports_hardware_threads() {
        let concurrency = Ec2Topology::new(METADATA_URL).unwrap().hardware_concurrency();
        assert!(concurrency.threads >= 1);
        assert!(concurrency.cores >= 1);
    }
}
