use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use http::{request::Parts, HeaderName};
use mockall::automock;

use idp_saml::Session;
use idp_slo::errors;

/// Authenticator decides who is behind a request before any protocol state
/// is built for it.
///
/// A rejection carries the response the authenticator wants the browser to
/// see (a login redirect, a 401, or nothing at all). The exchange sends it
/// unchanged and adds nothing of its own.
#[automock]
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, parts: &Parts) -> Result<Session, Rejection>;
}

pub struct Rejection {
    pub cause: anyhow::Error,
    pub response: Response,
}

impl Rejection {
    pub fn new(cause: anyhow::Error, response: Response) -> Self {
        Self { cause, response }
    }
}

impl std::fmt::Debug for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rejection")
            .field("cause", &self.cause)
            .field("status", &self.response.status())
            .finish()
    }
}

/// HeaderAuthenticator trusts the user id an authenticating reverse proxy
/// puts on the request.
#[derive(Debug, Clone)]
pub struct HeaderAuthenticator {
    header: HeaderName,
    lifetime: Duration,
}

impl HeaderAuthenticator {
    pub fn new(header: &str, lifetime: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            header: HeaderName::try_from(header)?,
            lifetime,
        })
    }
}

#[async_trait]
impl Authenticator for HeaderAuthenticator {
    async fn authenticate(&self, parts: &Parts) -> Result<Session, Rejection> {
        let user_id = parts
            .headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();
        if user_id.is_empty() {
            return Err(Rejection::new(
                anyhow::anyhow!("missing {} header", self.header),
                errors::unauthorized().into_response(),
            ));
        }
        let now = Utc::now();
        Ok(Session {
            id: uuid::Uuid::new_v4().to_string(),
            create_time: now,
            expire_time: now + self.lifetime,
            index: uuid::Uuid::new_v4().simple().to_string(),
            name_id: user_id.to_owned(),
            user_name: user_id.to_owned(),
            ..Default::default()
        })
    }
}
