//! SAML 2.0 protocol documents.
//!
//! Element names are written with their conventional prefixes (`samlp:`,
//! `saml:`, `md:`, `ds:`) and read back by local name, so documents from
//! SPs that pick other prefixes, or a default namespace, still parse.

mod assertion;
mod metadata;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

pub use assertion::{
    Algorithm, Assertion, Attribute, AttributeStatement, AudienceRestriction,
    AuthnContext, AuthnStatement, Conditions, KeyInfo, NameId, Reference,
    Signature, SignedInfo, Subject, SubjectConfirmation,
    SubjectConfirmationData, Transforms, X509Data,
};
pub use metadata::{
    Endpoint, EntityDescriptor, IdpSsoDescriptor, IndexedEndpoint,
    KeyDescriptor, SpSsoDescriptor,
};

pub const SAML_VERSION: &str = "2.0";

pub const HTTP_POST_BINDING: &str =
    "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
pub const HTTP_REDIRECT_BINDING: &str =
    "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";

pub const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

pub const NAME_ID_FORMAT_UNSPECIFIED: &str =
    "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";
pub const NAME_ID_FORMAT_TRANSIENT: &str =
    "urn:oasis:names:tc:SAML:2.0:nameid-format:transient";
pub const NAME_ID_FORMAT_PERSISTENT: &str =
    "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent";
pub const NAME_ID_FORMAT_EMAIL: &str =
    "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress";

pub const ATTRIBUTE_NAME_FORMAT_BASIC: &str =
    "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";

pub const SUBJECT_CONFIRMATION_BEARER: &str =
    "urn:oasis:names:tc:SAML:2.0:cm:bearer";

pub const AUTHN_CONTEXT_PASSWORD_PROTECTED_TRANSPORT: &str =
    "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport";

/// The qualified name a document is written under when it is the root.
pub trait XmlRoot {
    const ROOT: &'static str;
}

macro_rules! namespace {
    ($(#[$meta:meta])* $name:ident = $uri:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl $name {
            pub const URI: &'static str = $uri;
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(Self::URI)
            }
        }
    };
}

namespace!(
    /// `xmlns:samlp`
    ProtocolNs = "urn:oasis:names:tc:SAML:2.0:protocol"
);
namespace!(
    /// `xmlns:saml`
    AssertionNs = "urn:oasis:names:tc:SAML:2.0:assertion"
);
namespace!(
    /// `xmlns:md`
    MetadataNs = "urn:oasis:names:tc:SAML:2.0:metadata"
);
namespace!(
    /// `xmlns:ds`
    SignatureNs = "http://www.w3.org/2000/09/xmldsig#"
);

/// AuthnRequest is the SP's request for an assertion about the user.
///
/// Missing attributes read as empty values; judging them is left to the
/// identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequest {
    #[serde(rename(serialize = "@xmlns:samlp"), skip_deserializing)]
    pub xmlns_samlp: ProtocolNs,
    #[serde(rename(serialize = "@xmlns:saml"), skip_deserializing)]
    pub xmlns_saml: AssertionNs,
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@Version", default)]
    pub version: String,
    #[serde(rename = "@IssueInstant", default)]
    pub issue_instant: DateTime<Utc>,
    #[serde(
        rename = "@Destination",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub destination: Option<String>,
    #[serde(
        rename = "@AssertionConsumerServiceURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assertion_consumer_service_url: Option<String>,
    #[serde(
        rename = "@ProtocolBinding",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub protocol_binding: Option<String>,
    #[serde(
        rename(serialize = "saml:Issuer", deserialize = "Issuer"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub issuer: Option<Issuer>,
    #[serde(
        rename(serialize = "samlp:NameIDPolicy", deserialize = "NameIDPolicy"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name_id_policy: Option<NameIdPolicy>,
}

impl XmlRoot for AuthnRequest {
    const ROOT: &'static str = "samlp:AuthnRequest";
}

impl AuthnRequest {
    pub fn issuer_value(&self) -> Option<&str> {
        self.issuer.as_ref().map(|issuer| issuer.value.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    #[serde(
        rename = "@Format",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub format: Option<String>,
    #[serde(rename = "$text", default)]
    pub value: String,
}

impl Issuer {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self {
            format: None,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdPolicy {
    #[serde(
        rename = "@Format",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub format: Option<String>,
    #[serde(
        rename = "@AllowCreate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub allow_create: Option<bool>,
}

/// Response is the protocol envelope carrying the assertion back to the SP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename(serialize = "@xmlns:samlp"), skip_deserializing)]
    pub xmlns_samlp: ProtocolNs,
    #[serde(rename(serialize = "@xmlns:saml"), skip_deserializing)]
    pub xmlns_saml: AssertionNs,
    #[serde(rename = "@ID")]
    pub id: String,
    #[serde(
        rename = "@InResponseTo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub in_response_to: Option<String>,
    #[serde(rename = "@Version")]
    pub version: String,
    #[serde(rename = "@IssueInstant")]
    pub issue_instant: DateTime<Utc>,
    #[serde(
        rename = "@Destination",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub destination: Option<String>,
    #[serde(rename(serialize = "saml:Issuer", deserialize = "Issuer"))]
    pub issuer: Issuer,
    #[serde(
        rename(serialize = "ds:Signature", deserialize = "Signature"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub signature: Option<Signature>,
    #[serde(rename(serialize = "samlp:Status", deserialize = "Status"))]
    pub status: Status,
    #[serde(
        rename(serialize = "saml:Assertion", deserialize = "Assertion"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assertion: Option<Assertion>,
}

impl XmlRoot for Response {
    const ROOT: &'static str = "samlp:Response";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    #[serde(rename(serialize = "samlp:StatusCode", deserialize = "StatusCode"))]
    pub status_code: StatusCode,
    #[serde(
        rename(serialize = "samlp:StatusMessage", deserialize = "StatusMessage"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status_message: Option<String>,
}

impl Status {
    pub fn success() -> Self {
        Self {
            status_code: StatusCode {
                value: STATUS_SUCCESS.to_owned(),
            },
            status_message: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    #[serde(rename = "@Value")]
    pub value: String,
}
