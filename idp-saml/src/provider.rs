use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::schema::{Assertion, AuthnRequest, EntityDescriptor, Response};
use crate::session::Session;

/// IdentityProvider owns the IdP's keys and its knowledge of service
/// providers. The SSO exchange only ever reaches it through these calls.
///
/// Implementations are shared by every in-flight exchange and must only
/// read their key material while serving one.
///
/// See: https://docs.oasis-open.org/security/saml/v2.0/saml-profiles-2.0-os.pdf
/// "4.1 Web Browser SSO Profile"
#[automock]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The IdP's own metadata document.
    async fn metadata(&self) -> Result<EntityDescriptor>;

    /// Validate the request against the authenticated session and produce
    /// the assertion answering it.
    async fn make_assertion(
        &self,
        request: &AuthnRequest,
        session: &Session,
    ) -> Result<Assertion>;

    /// Bring the assertion into its final embeddable form, for example by
    /// signing it in place.
    async fn marshal_assertion(&self, assertion: &mut Assertion) -> Result<()>;

    /// Wrap the assertion into the response envelope.
    async fn make_response(
        &self,
        request: &AuthnRequest,
        assertion: &Assertion,
    ) -> Result<Response>;
}
