use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mockall::automock;
use tracing::debug;

use idp_saml::{codec, schema::EntityDescriptor};

/// MetadataFetcher retrieves a service provider's metadata document.
#[automock]
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<EntityDescriptor>;
}

#[derive(Debug, Clone)]
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
}

impl HttpMetadataFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("could not build metadata http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, url: &str) -> Result<EntityDescriptor> {
        debug!("fetching service provider metadata from {}", url);
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let metadata = codec::unmarshal::<EntityDescriptor>(&body)?;
        Ok(metadata)
    }
}
