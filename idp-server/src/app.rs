use std::{ops::Deref, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::info;

use idp_saml::IdentityProvider;
use idp_slo::errors;

use crate::{
    services::{
        auth::{Authenticator, HeaderAuthenticator},
        fetch::{HttpMetadataFetcher, MetadataFetcher},
        idp::Middleware,
        local::LocalIdentityProvider,
    },
    AppConfig,
};

pub struct App {
    pub config: AppConfig,
    pub middleware: Arc<Middleware>,
    pub authenticator: Arc<dyn Authenticator>,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("initializing identity provider...");

        let idp = LocalIdentityProvider::from_config(&config)
            .context("could not initialize the identity provider")?;
        let fetcher =
            HttpMetadataFetcher::new(Duration::from_secs(config.metadata_timeout))?;
        let authenticator = HeaderAuthenticator::new(
            &config.user_header,
            chrono::Duration::seconds(config.assertion_lifetime),
        )
        .context("invalid user header")?;

        info!(
            "identity provider {} serving {} service providers",
            config.entity_id(),
            config.service_providers.len()
        );
        Ok(Self::with_parts(
            config,
            Arc::new(idp),
            Arc::new(fetcher),
            Arc::new(authenticator),
        ))
    }

    /// Assemble an app around caller supplied collaborators.
    pub fn with_parts(
        config: AppConfig,
        idp: Arc<dyn IdentityProvider>,
        fetcher: Arc<dyn MetadataFetcher>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let middleware =
            Arc::new(Middleware::new(idp, fetcher, config.max_inflate_size));
        Self {
            config,
            middleware,
            authenticator,
        }
    }

    /// Metadata URL registered for the service provider `entity_id`.
    pub fn sp_metadata_url(&self, entity_id: &str) -> Option<&str> {
        self.config
            .service_providers
            .iter()
            .find(|sp| sp.entity_id == entity_id)
            .and_then(|sp| sp.metadata_url.as_deref())
    }
}

#[derive(Clone)]
pub struct AppState(pub Arc<App>);

// deref so you can still access the inner fields easily
impl Deref for AppState {
    type Target = App;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AppState
where
    Self: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = errors::WithBacktrace;
    async fn from_request_parts(
        _: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_ref(state))
    }
}
