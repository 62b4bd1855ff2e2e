use std::{fmt, sync::Arc};

use axum::{extract::Request, response::Response};
use chrono::Utc;
use tracing::warn;

use idp_saml::schema::{
    AuthnRequest, EntityDescriptor, Issuer, HTTP_POST_BINDING, SAML_VERSION,
};
use idp_slo::{errors, Result};

use super::Middleware;
use crate::{services::auth::Authenticator, var::SSO_EXCHANGES_TOTAL};

/// LoginRequest starts an IdP-initiated exchange toward one service
/// provider whose metadata has already been fetched.
pub struct LoginRequest {
    sp_metadata_url: String,
    middleware: Arc<Middleware>,
    authenticator: Arc<dyn Authenticator>,
    metadata: EntityDescriptor,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("sp_metadata_url", &self.sp_metadata_url)
            .field("entity_id", &self.metadata.entity_id)
            .finish_non_exhaustive()
    }
}

impl LoginRequest {
    pub(super) fn new(
        sp_metadata_url: String,
        middleware: Arc<Middleware>,
        authenticator: Arc<dyn Authenticator>,
        metadata: EntityDescriptor,
    ) -> Self {
        Self {
            sp_metadata_url,
            middleware,
            authenticator,
            metadata,
        }
    }

    pub fn sp_metadata_url(&self) -> &str {
        &self.sp_metadata_url
    }

    pub fn metadata(&self) -> &EntityDescriptor {
        &self.metadata
    }

    /// The unsolicited request this login answers. Its ID is empty, so no
    /// InResponseTo ends up in the response.
    pub fn authn_request(&self) -> Result<AuthnRequest> {
        let acs = self
            .metadata
            .sp_sso_descriptor
            .as_ref()
            .ok_or_else(|| {
                errors::metadata_fetch(&format!(
                    "{} describes no service provider",
                    self.sp_metadata_url
                ))
            })?
            .post_assertion_consumer_service()
            .ok_or_else(|| {
                errors::metadata_fetch(&format!(
                    "{} has no HTTP-POST assertion consumer service",
                    self.sp_metadata_url
                ))
            })?;
        Ok(AuthnRequest {
            id: String::new(),
            version: SAML_VERSION.to_owned(),
            issue_instant: Utc::now(),
            assertion_consumer_service_url: Some(acs.location.clone()),
            protocol_binding: Some(HTTP_POST_BINDING.to_owned()),
            issuer: Some(Issuer::new(self.metadata.entity_id.as_str())),
            ..Default::default()
        })
    }

    pub async fn serve(&self, req: Request, relay_state: String) -> Response {
        let (parts, _body) = req.into_parts();
        let session = match self.authenticator.authenticate(&parts).await {
            Ok(session) => session,
            Err(rejection) => {
                warn!("authenticate: {:#}", rejection.cause);
                SSO_EXCHANGES_TOTAL.with_label_values(&["rejected"]).inc();
                return rejection.response;
            }
        };
        let result = match self.authn_request() {
            Ok(request) => {
                self.middleware
                    .respond(&parts, &session, request, relay_state)
                    .await
            }
            Err(err) => Err(err),
        };
        self.middleware.send(result)
    }
}
