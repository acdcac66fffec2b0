//! HTTP transport for contracts and release tarballs
//!
//! Everything the catalog downloads goes through the [`Transport`] trait so
//! the resolver and the synchronization pipeline can be driven by an
//! in-memory source in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::error::CatalogError;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("catalog-cd/", env!("CARGO_PKG_VERSION"));

/// Fetches the full body of a URL
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and return the body. Anything but `200 OK` is an error.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Transport backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with default settings
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Create a transport around an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(CatalogError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {url}"))?;

        Ok(bytes.to_vec())
    }
}
