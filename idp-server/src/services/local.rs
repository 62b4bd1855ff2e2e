use std::fs;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use idp_saml::{
    schema::{
        self, Assertion, Attribute, AttributeStatement, AudienceRestriction,
        AuthnContext, AuthnRequest, AuthnStatement, Conditions, Endpoint,
        EntityDescriptor, IdpSsoDescriptor, Issuer, KeyDescriptor, KeyInfo,
        NameId, ProtocolNs, Status, Subject, SubjectConfirmation,
        SubjectConfirmationData, X509Data,
    },
    IdentityProvider, Session,
};

use crate::config::{AppConfig, ServiceProviderConfig};

const METADATA_VALIDITY_HOURS: i64 = 48;

/// LocalIdentityProvider answers for the service providers listed in the
/// configuration. It does not sign what it issues.
#[derive(Debug, Clone)]
pub struct LocalIdentityProvider {
    entity_id: String,
    sso_url: String,
    certificate: Option<String>,
    service_providers: Vec<ServiceProviderConfig>,
    assertion_lifetime: Duration,
    max_issue_delay: Duration,
}

impl LocalIdentityProvider {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let certificate = match &config.certificate {
            Some(path) => {
                let pem = fs::read_to_string(path).with_context(|| {
                    format!("could not read certificate {path}")
                })?;
                Some(pem_body(&pem))
            }
            None => None,
        };
        Ok(Self {
            entity_id: config.entity_id(),
            sso_url: config.sso_url(),
            certificate,
            service_providers: config.service_providers.clone(),
            assertion_lifetime: Duration::seconds(config.assertion_lifetime),
            max_issue_delay: Duration::seconds(config.max_issue_delay),
        })
    }

    fn service_provider(&self, entity_id: &str) -> Option<&ServiceProviderConfig> {
        self.service_providers
            .iter()
            .find(|sp| sp.entity_id == entity_id)
    }

    fn validate(&self, request: &AuthnRequest) -> Result<&ServiceProviderConfig> {
        if request.version != schema::SAML_VERSION {
            bail!("unsupported SAML version {:?}", request.version);
        }
        let issuer = request.issuer_value().unwrap_or_default();
        let Some(sp) = self.service_provider(issuer) else {
            bail!("unknown service provider {issuer:?}");
        };
        if let Some(acs) = &request.assertion_consumer_service_url {
            if *acs != sp.acs_url {
                bail!("assertion consumer service {acs} is not registered for {issuer}");
            }
        }
        if let Some(destination) = &request.destination {
            if *destination != self.sso_url {
                bail!("wrong destination {destination}");
            }
        }
        let skew = Utc::now() - request.issue_instant;
        if skew.num_seconds().abs() > self.max_issue_delay.num_seconds() {
            bail!("request issued at {} is out of range", request.issue_instant);
        }
        Ok(sp)
    }
}

/// The base64 body of a PEM block, without armor lines or line breaks.
fn pem_body(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect()
}

fn new_id() -> String {
    format!("id-{}", Uuid::new_v4().simple())
}

fn attribute(name: &str, values: Vec<String>) -> Option<Attribute> {
    let values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
    if values.is_empty() {
        return None;
    }
    Some(Attribute {
        name: name.to_owned(),
        name_format: Some(schema::ATTRIBUTE_NAME_FORMAT_BASIC.to_owned()),
        friendly_name: Some(name.to_owned()),
        values,
    })
}

fn attributes(session: &Session) -> Vec<Attribute> {
    [
        attribute("uid", vec![session.user_name.clone()]),
        attribute("mail", vec![session.user_email.clone()]),
        attribute("cn", vec![session.user_common_name.clone()]),
        attribute("sn", vec![session.user_surname.clone()]),
        attribute("givenName", vec![session.user_given_name.clone()]),
        attribute("eduPersonAffiliation", session.groups.clone()),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn metadata(&self) -> Result<EntityDescriptor> {
        let key_descriptors = self
            .certificate
            .iter()
            .map(|cert| KeyDescriptor {
                key_use: Some("signing".to_owned()),
                key_info: KeyInfo {
                    x509_data: X509Data {
                        certificates: vec![cert.clone()],
                    },
                    ..Default::default()
                },
            })
            .collect();
        let single_sign_on_services =
            [schema::HTTP_REDIRECT_BINDING, schema::HTTP_POST_BINDING]
                .into_iter()
                .map(|binding| Endpoint {
                    binding: binding.to_owned(),
                    location: self.sso_url.clone(),
                })
                .collect();
        Ok(EntityDescriptor {
            entity_id: self.entity_id.clone(),
            valid_until: Some(Utc::now() + Duration::hours(METADATA_VALIDITY_HOURS)),
            idp_sso_descriptor: Some(IdpSsoDescriptor {
                protocol_support_enumeration: ProtocolNs::URI.to_owned(),
                want_authn_requests_signed: Some(false),
                key_descriptors,
                name_id_formats: vec![
                    schema::NAME_ID_FORMAT_TRANSIENT.to_owned(),
                    schema::NAME_ID_FORMAT_PERSISTENT.to_owned(),
                    schema::NAME_ID_FORMAT_EMAIL.to_owned(),
                ],
                single_sign_on_services,
            }),
            ..Default::default()
        })
    }

    async fn make_assertion(
        &self,
        request: &AuthnRequest,
        session: &Session,
    ) -> Result<Assertion> {
        let sp = self.validate(request)?;
        let now = Utc::now();
        let not_on_or_after = now + self.assertion_lifetime;
        let in_response_to =
            (!request.id.is_empty()).then(|| request.id.clone());
        let name_id_format = request
            .name_id_policy
            .as_ref()
            .and_then(|policy| policy.format.clone())
            .unwrap_or_else(|| schema::NAME_ID_FORMAT_UNSPECIFIED.to_owned());
        let attributes = attributes(session);

        Ok(Assertion {
            id: new_id(),
            version: schema::SAML_VERSION.to_owned(),
            issue_instant: now,
            issuer: Issuer::new(self.entity_id.as_str()),
            subject: Some(Subject {
                name_id: Some(NameId {
                    format: Some(name_id_format),
                    name_qualifier: Some(self.entity_id.clone()),
                    sp_name_qualifier: Some(sp.entity_id.clone()),
                    value: session.name_id.clone(),
                }),
                subject_confirmation: Some(SubjectConfirmation {
                    method: schema::SUBJECT_CONFIRMATION_BEARER.to_owned(),
                    subject_confirmation_data: Some(SubjectConfirmationData {
                        address: None,
                        in_response_to,
                        not_on_or_after: Some(not_on_or_after),
                        recipient: Some(sp.acs_url.clone()),
                    }),
                }),
            }),
            conditions: Some(Conditions {
                not_before: Some(now),
                not_on_or_after: Some(not_on_or_after),
                audience_restrictions: vec![AudienceRestriction {
                    audiences: vec![sp.entity_id.clone()],
                }],
            }),
            authn_statement: Some(AuthnStatement {
                authn_instant: session.create_time,
                session_index: Some(session.index.clone()),
                session_not_on_or_after: Some(session.expire_time),
                authn_context: AuthnContext {
                    authn_context_class_ref: Some(
                        schema::AUTHN_CONTEXT_PASSWORD_PROTECTED_TRANSPORT
                            .to_owned(),
                    ),
                },
            }),
            attribute_statement: (!attributes.is_empty())
                .then_some(AttributeStatement { attributes }),
            ..Default::default()
        })
    }

    async fn marshal_assertion(&self, _assertion: &mut Assertion) -> Result<()> {
        Ok(())
    }

    async fn make_response(
        &self,
        request: &AuthnRequest,
        assertion: &Assertion,
    ) -> Result<schema::Response> {
        Ok(schema::Response {
            id: new_id(),
            in_response_to: (!request.id.is_empty()).then(|| request.id.clone()),
            version: schema::SAML_VERSION.to_owned(),
            issue_instant: Utc::now(),
            destination: assertion.recipient().map(str::to_owned),
            issuer: Issuer::new(self.entity_id.as_str()),
            status: Status::success(),
            assertion: Some(assertion.clone()),
            ..Default::default()
        })
    }
}
