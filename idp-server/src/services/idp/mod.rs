pub(crate) mod form;
mod login;

use std::{fmt, sync::Arc};

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use http::{header::CONTENT_TYPE, request::Parts, Uri};
use tracing::{info, warn};

use idp_saml::{
    codec,
    schema::{self, Assertion, AuthnRequest},
    IdentityProvider, Session,
};
use idp_slo::{errors, Result};

use crate::{
    services::{auth::Authenticator, fetch::MetadataFetcher},
    var::SSO_EXCHANGES_TOTAL,
};

pub use form::RedirectForm;
pub use login::LoginRequest;

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const METADATA_CONTENT_TYPE: &str = "application/xml; charset=utf8";
const FORM_CONTENT_TYPE: &str = "text/html";

/// Middleware serves the IdP side of the web browser SSO profile on top of
/// an [`IdentityProvider`].
pub struct Middleware {
    idp: Arc<dyn IdentityProvider>,
    fetcher: Arc<dyn MetadataFetcher>,
    max_inflate_size: usize,
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("max_inflate_size", &self.max_inflate_size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct SsoParams {
    saml_request: String,
    relay_state: String,
}

impl SsoParams {
    /// The first `SAMLRequest` and `RelayState` of the query; repeats are
    /// ignored. Percent-encoded bytes that are not UTF-8 are replaced with
    /// U+FFFD since the form carries relay state as text.
    fn from_uri(uri: &Uri) -> Self {
        let mut saml_request = None;
        let mut relay_state = None;
        let query = uri.query().unwrap_or_default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "SAMLRequest" if saml_request.is_none() => {
                    saml_request = Some(value.into_owned())
                }
                "RelayState" if relay_state.is_none() => {
                    relay_state = Some(value.into_owned())
                }
                _ => {}
            }
        }
        Self {
            saml_request: saml_request.unwrap_or_default(),
            relay_state: relay_state.unwrap_or_default(),
        }
    }
}

impl Middleware {
    pub fn new(
        idp: Arc<dyn IdentityProvider>,
        fetcher: Arc<dyn MetadataFetcher>,
        max_inflate_size: usize,
    ) -> Self {
        Self {
            idp,
            fetcher,
            max_inflate_size,
        }
    }

    /// The IdP metadata document, regenerated on every call.
    pub async fn metadata(&self) -> Result<Vec<u8>> {
        let metadata = self.idp.metadata().await.map_err(|err| {
            errors::metadata_generation(&format!(
                "failed to generate metadata: {err:#}"
            ))
        })?;
        let out = codec::marshal_indent(&metadata).map_err(|err| {
            errors::marshal(&format!("failed to build metadata: {err}"))
        })?;
        let mut buf = Vec::with_capacity(XML_HEADER.len() + out.len());
        buf.extend_from_slice(XML_HEADER.as_bytes());
        buf.extend_from_slice(out.as_bytes());
        Ok(buf)
    }

    pub async fn serve_metadata(&self) -> Response {
        match self.metadata().await {
            Ok(body) => {
                ([(CONTENT_TYPE, METADATA_CONTENT_TYPE)], body).into_response()
            }
            Err(err) => err.into_response(),
        }
    }

    /// Run one SSO exchange for `req`.
    ///
    /// When the authenticator rejects the caller its response is returned as
    /// is; otherwise the result is either the auto-submit form or a single
    /// opaque error.
    pub async fn serve_sso(
        &self,
        authenticator: &dyn Authenticator,
        req: Request,
    ) -> Response {
        let (parts, _body) = req.into_parts();
        let session = match authenticator.authenticate(&parts).await {
            Ok(session) => session,
            Err(rejection) => {
                warn!("authenticate: {:#}", rejection.cause);
                SSO_EXCHANGES_TOTAL.with_label_values(&["rejected"]).inc();
                return rejection.response;
            }
        };
        let result = self.exchange(&parts, &session).await;
        self.send(result)
    }

    pub async fn new_login_request(
        self: &Arc<Self>,
        sp_metadata_url: &str,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<LoginRequest> {
        let metadata =
            self.fetcher.fetch(sp_metadata_url).await.map_err(|err| {
                errors::metadata_fetch(&format!(
                    "failed to get metadata from {sp_metadata_url}: {err:#}"
                ))
            })?;
        Ok(LoginRequest::new(
            sp_metadata_url.to_owned(),
            Arc::clone(self),
            authenticator,
            metadata,
        ))
    }

    async fn exchange(&self, parts: &Parts, session: &Session) -> Result<Vec<u8>> {
        let params = SsoParams::from_uri(&parts.uri);
        let request =
            codec::decode_authn_request(&params.saml_request, self.max_inflate_size)?;
        self.respond(parts, session, request, params.relay_state).await
    }

    /// Everything after the request is known: assertion, response, form.
    async fn respond(
        &self,
        parts: &Parts,
        session: &Session,
        request: AuthnRequest,
        relay_state: String,
    ) -> Result<Vec<u8>> {
        let mut exchange = IdpAuthnRequest::new(
            self.idp.as_ref(),
            parts,
            request,
            relay_state,
        );
        exchange.make_assertion(session).await?;
        exchange.marshal_assertion().await?;
        exchange.make_response().await?;
        exchange.render()
    }

    fn send(&self, result: Result<Vec<u8>>) -> Response {
        match result {
            Ok(body) => {
                SSO_EXCHANGES_TOTAL.with_label_values(&["sent"]).inc();
                ([(CONTENT_TYPE, FORM_CONTENT_TYPE)], body).into_response()
            }
            Err(err) => {
                SSO_EXCHANGES_TOTAL.with_label_values(&["aborted"]).inc();
                err.into_response()
            }
        }
    }
}

/// Where an exchange stands. Steps only ever move forward by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Decoded,
    Asserted,
    Marshaled,
    Responded,
    Rendered,
}

/// IdpAuthnRequest is the state of one exchange. It lives for a single
/// handler invocation and is never shared.
pub struct IdpAuthnRequest<'a> {
    idp: &'a dyn IdentityProvider,
    pub http_request: &'a Parts,
    pub request: AuthnRequest,
    pub relay_state: String,
    pub assertion: Option<Assertion>,
    pub response: Option<schema::Response>,
    state: ExchangeState,
}

impl fmt::Debug for IdpAuthnRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdpAuthnRequest")
            .field("request", &self.request.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'a> IdpAuthnRequest<'a> {
    pub fn new(
        idp: &'a dyn IdentityProvider,
        http_request: &'a Parts,
        request: AuthnRequest,
        relay_state: String,
    ) -> Self {
        Self {
            idp,
            http_request,
            request,
            relay_state,
            assertion: None,
            response: None,
            state: ExchangeState::Decoded,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    fn expect_state(&self, expected: ExchangeState) -> Result<()> {
        if self.state != expected {
            return Err(errors::anyhow(anyhow::anyhow!(
                "exchange step out of order: at {:?}, expected {:?}",
                self.state,
                expected
            )));
        }
        Ok(())
    }

    pub async fn make_assertion(&mut self, session: &Session) -> Result<()> {
        self.expect_state(ExchangeState::Decoded)?;
        let assertion = self
            .idp
            .make_assertion(&self.request, session)
            .await
            .map_err(|err| {
                errors::assertion(&format!("failed to make assertion: {err:#}"))
            })?;
        info!(
            "issued assertion {} for request {} from {}",
            assertion.id,
            self.request.id,
            self.request.issuer_value().unwrap_or_default()
        );
        self.assertion = Some(assertion);
        self.state = ExchangeState::Asserted;
        Ok(())
    }

    pub async fn marshal_assertion(&mut self) -> Result<()> {
        self.expect_state(ExchangeState::Asserted)?;
        let assertion = self.assertion.as_mut().ok_or_else(|| {
            errors::marshal("failed to marshal assertion: no assertion")
        })?;
        self.idp.marshal_assertion(assertion).await.map_err(|err| {
            errors::marshal(&format!("failed to marshal assertion: {err:#}"))
        })?;
        self.state = ExchangeState::Marshaled;
        Ok(())
    }

    pub async fn make_response(&mut self) -> Result<()> {
        self.expect_state(ExchangeState::Marshaled)?;
        let assertion = self.assertion.as_ref().ok_or_else(|| {
            errors::marshal("failed to build response: no assertion")
        })?;
        let response = self
            .idp
            .make_response(&self.request, assertion)
            .await
            .map_err(|err| {
                errors::marshal(&format!("failed to build response: {err:#}"))
            })?;
        self.response = Some(response);
        self.state = ExchangeState::Responded;
        Ok(())
    }

    /// Encode the response and render the form that carries it to the
    /// assertion's recipient.
    pub fn render(&mut self) -> Result<Vec<u8>> {
        self.expect_state(ExchangeState::Responded)?;
        let response = self.response.as_ref().ok_or_else(|| {
            errors::marshal("failed to format response: no response")
        })?;
        let form_action = self
            .assertion
            .as_ref()
            .and_then(Assertion::recipient)
            .ok_or_else(|| {
                errors::assertion(
                    "failed to build form: assertion names no recipient",
                )
            })?
            .to_owned();
        let form = RedirectForm {
            form_action,
            relay_state: self.relay_state.clone(),
            saml_response: codec::encode_response(response)?,
        };
        let body = form.render_bytes()?;
        self.state = ExchangeState::Rendered;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use chrono::Utc;
    use http::StatusCode;

    use idp_saml::{
        schema::{
            EntityDescriptor, IdpSsoDescriptor, Issuer, Status, Subject,
            SubjectConfirmation, SubjectConfirmationData, SAML_VERSION,
        },
        MockIdentityProvider,
    };

    use super::form::tests::{action, field};
    use super::*;
    use crate::services::{
        auth::{MockAuthenticator, Rejection},
        fetch::MockMetadataFetcher,
    };

    pub(crate) const ACS_URL: &str = "https://sp.example.com/saml/acs";

    pub(crate) fn assertion() -> Assertion {
        Assertion {
            id: "id-assertion".to_owned(),
            version: SAML_VERSION.to_owned(),
            issue_instant: Utc::now(),
            issuer: Issuer::new("https://idp.example.com/metadata"),
            subject: Some(Subject {
                name_id: None,
                subject_confirmation: Some(SubjectConfirmation {
                    method: schema::SUBJECT_CONFIRMATION_BEARER.to_owned(),
                    subject_confirmation_data: Some(SubjectConfirmationData {
                        recipient: Some(ACS_URL.to_owned()),
                        ..Default::default()
                    }),
                }),
            }),
            ..Default::default()
        }
    }

    pub(crate) fn happy_idp() -> MockIdentityProvider {
        let mut idp = MockIdentityProvider::new();
        idp.expect_make_assertion()
            .times(1)
            .returning(|_, _| Ok(assertion()));
        idp.expect_marshal_assertion().times(1).returning(|_| Ok(()));
        idp.expect_make_response()
            .times(1)
            .returning(|request, assertion| {
                Ok(schema::Response {
                    id: "id-response".to_owned(),
                    in_response_to: (!request.id.is_empty())
                        .then(|| request.id.clone()),
                    version: SAML_VERSION.to_owned(),
                    issue_instant: Utc::now(),
                    destination: assertion.recipient().map(str::to_owned),
                    issuer: Issuer::new("https://idp.example.com/metadata"),
                    status: Status::success(),
                    assertion: Some(assertion.clone()),
                    ..Default::default()
                })
            });
        idp
    }

    pub(crate) fn accept_all() -> MockAuthenticator {
        let mut auth = MockAuthenticator::new();
        auth.expect_authenticate().returning(|_| {
            Ok(Session {
                name_id: "alice".to_owned(),
                ..Default::default()
            })
        });
        auth
    }

    fn middleware(idp: MockIdentityProvider) -> Middleware {
        Middleware::new(
            Arc::new(idp),
            Arc::new(MockMetadataFetcher::new()),
            codec::DEFAULT_MAX_INFLATE_SIZE,
        )
    }

    pub(crate) fn sso_uri(relay_state: &str) -> String {
        let raw = STANDARD.encode(
            codec::deflate(
                br#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="abc" Version="2.0" IssueInstant="2024-05-01T10:00:00Z" AssertionConsumerServiceURL="https://sp.example.com/saml/acs"><saml:Issuer>https://sp.example.com/saml/metadata</saml:Issuer></samlp:AuthnRequest>"#,
            )
            .unwrap(),
        );
        format!(
            "/sso?SAMLRequest={}&RelayState={}",
            percent(&raw),
            percent(relay_state)
        )
    }

    fn percent(s: &str) -> String {
        s.bytes()
            .map(|b| match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => {
                    (b as char).to_string()
                }
                _ => format!("%{b:02X}"),
            })
            .collect()
    }

    fn get(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn sso_renders_redirect_form() {
        let m = middleware(happy_idp());
        let response = m.serve_sso(&accept_all(), get(&sso_uri("state1"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html");

        let html = body(response).await;
        assert_eq!(action(&html).as_deref(), Some(ACS_URL));
        assert_eq!(field(&html, "RelayState").as_deref(), Some("state1"));

        let encoded = field(&html, "SAMLResponse").unwrap();
        let xml = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        let decoded: schema::Response = codec::unmarshal(&xml).unwrap();
        assert_eq!(decoded.in_response_to.as_deref(), Some("abc"));
        assert_eq!(decoded.assertion.unwrap().recipient(), Some(ACS_URL));
    }

    #[tokio::test]
    async fn relay_state_passes_through_verbatim() {
        let m = middleware(happy_idp());
        let state = "a b&c=d/é";
        let response = m.serve_sso(&accept_all(), get(&sso_uri(state))).await;
        let html = body(response).await;
        assert_eq!(field(&html, "RelayState").as_deref(), Some(state));
    }

    #[tokio::test]
    async fn repeated_parameters_use_the_first_value() {
        let m = middleware(happy_idp());
        let uri = format!(
            "{}&SAMLRequest=bm90IGRlZmxhdGU%3D&RelayState=second",
            sso_uri("first")
        );
        let response = m.serve_sso(&accept_all(), get(&uri)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body(response).await;
        assert_eq!(field(&html, "RelayState").as_deref(), Some("first"));
    }

    #[test]
    fn sso_params_from_query() {
        let uri: Uri = "/sso?RelayState=a%2Bb+c&SAMLRequest=x&RelayState=z"
            .parse()
            .unwrap();
        assert_eq!(
            SsoParams::from_uri(&uri),
            SsoParams {
                saml_request: "x".to_owned(),
                relay_state: "a+b c".to_owned(),
            }
        );

        let uri: Uri = "/sso".parse().unwrap();
        assert_eq!(SsoParams::from_uri(&uri), SsoParams::default());

        let uri: Uri = "/sso?RelayState=%FF".parse().unwrap();
        assert_eq!(SsoParams::from_uri(&uri).relay_state, "\u{fffd}");
    }

    #[tokio::test]
    async fn rejected_caller_gets_only_the_authenticator_response() {
        let mut idp = MockIdentityProvider::new();
        idp.expect_make_assertion().never();
        let m = middleware(idp);

        let mut auth = MockAuthenticator::new();
        auth.expect_authenticate().times(1).returning(|_| {
            Err(Rejection::new(
                anyhow::anyhow!("no session"),
                Response::default(),
            ))
        });

        let response = m.serve_sso(&auth, get(&sso_uri("state1"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
        assert!(body(response).await.is_empty());
    }

    #[tokio::test]
    async fn malformed_request_is_opaque_bad_request() {
        let mut idp = MockIdentityProvider::new();
        idp.expect_make_assertion().never();
        let m = middleware(idp);

        let response = m
            .serve_sso(&accept_all(), get("/sso?SAMLRequest=%25%25%25"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let text = body(response).await;
        assert!(!text.contains("SAMLRequest"));
        assert!(text.contains("1020001"));
    }

    #[tokio::test]
    async fn assertion_failure_aborts_before_response() {
        let mut idp = MockIdentityProvider::new();
        idp.expect_make_assertion()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("unknown service provider")));
        idp.expect_marshal_assertion().never();
        idp.expect_make_response().never();
        let m = middleware(idp);

        let response = m.serve_sso(&accept_all(), get(&sso_uri(""))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!body(response).await.contains("unknown service provider"));
    }

    #[tokio::test]
    async fn sparse_request_is_judged_by_the_identity_provider() {
        let mut idp = MockIdentityProvider::new();
        idp.expect_make_assertion()
            .withf(|request, _| {
                request.id == "abc" && request.version.is_empty()
            })
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("unsupported SAML version")));
        idp.expect_make_response().never();
        let m = middleware(idp);

        let raw = STANDARD.encode(
            codec::deflate(br#"<AuthnRequest ID="abc"/>"#).unwrap(),
        );
        let uri = format!("/sso?SAMLRequest={}", percent(&raw));
        let response = m.serve_sso(&accept_all(), get(&uri)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn marshal_failure_aborts() {
        let mut idp = MockIdentityProvider::new();
        idp.expect_make_assertion()
            .returning(|_, _| Ok(assertion()));
        idp.expect_marshal_assertion()
            .returning(|_| Err(anyhow::anyhow!("signing key unavailable")));
        idp.expect_make_response().never();
        let m = middleware(idp);

        let response = m.serve_sso(&accept_all(), get(&sso_uri(""))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn assertion_without_recipient_aborts() {
        let mut idp = MockIdentityProvider::new();
        idp.expect_make_assertion().returning(|_, _| {
            let mut a = assertion();
            a.subject = None;
            Ok(a)
        });
        idp.expect_marshal_assertion().returning(|_| Ok(()));
        idp.expect_make_response()
            .returning(|_, _| Ok(schema::Response::default()));
        let m = middleware(idp);

        let response = m.serve_sso(&accept_all(), get(&sso_uri(""))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let idp = happy_idp();
        let parts = get("/sso").into_parts().0;
        let mut exchange = IdpAuthnRequest::new(
            &idp,
            &parts,
            AuthnRequest::default(),
            String::new(),
        );
        assert!(exchange.make_response().await.is_err());
        assert_eq!(exchange.state(), ExchangeState::Decoded);

        exchange.make_assertion(&Session::default()).await.unwrap();
        exchange.marshal_assertion().await.unwrap();
        exchange.make_response().await.unwrap();
        assert_eq!(exchange.state(), ExchangeState::Responded);
        exchange.render().unwrap();
        assert_eq!(exchange.state(), ExchangeState::Rendered);
    }

    #[tokio::test]
    async fn metadata_has_xml_preamble() {
        let mut idp = MockIdentityProvider::new();
        idp.expect_metadata().times(1).returning(|| {
            Ok(EntityDescriptor {
                entity_id: "https://idp.example.com/metadata".to_owned(),
                idp_sso_descriptor: Some(IdpSsoDescriptor {
                    protocol_support_enumeration: schema::ProtocolNs::URI
                        .to_owned(),
                    ..Default::default()
                }),
                ..Default::default()
            })
        });
        let m = middleware(idp);

        let response = m.serve_metadata().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "application/xml; charset=utf8"
        );
        let text = body(response).await;
        let xml = text
            .strip_prefix("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n")
            .unwrap();
        assert!(xml.starts_with("<md:EntityDescriptor "));
        assert!(xml.contains("\n\t<md:IDPSSODescriptor "));
        let parsed: EntityDescriptor = codec::unmarshal(xml).unwrap();
        assert_eq!(parsed.entity_id, "https://idp.example.com/metadata");
    }

    #[tokio::test]
    async fn metadata_failure_writes_no_xml() {
        let mut idp = MockIdentityProvider::new();
        idp.expect_metadata()
            .returning(|| Err(anyhow::anyhow!("certificate expired")));
        let m = middleware(idp);

        let response = m.serve_metadata().await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = body(response).await;
        assert!(!text.contains("<?xml"));
        assert!(!text.contains("certificate expired"));
    }

    #[tokio::test]
    async fn login_request_fetch_failure() {
        let mut fetcher = MockMetadataFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection refused")));
        let m = Arc::new(Middleware::new(
            Arc::new(MockIdentityProvider::new()),
            Arc::new(fetcher),
            codec::DEFAULT_MAX_INFLATE_SIZE,
        ));
        let err = m
            .new_login_request(
                "https://sp.example.com/saml/metadata",
                Arc::new(accept_all()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            errors::Code::from(err),
            errors::Code::MetadataFetch(_)
        ));
    }
}
