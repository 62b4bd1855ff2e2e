use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AssertionNs, Issuer, SignatureNs};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(rename(serialize = "@xmlns:saml"), skip_deserializing)]
    pub xmlns_saml: AssertionNs,
    #[serde(rename = "@ID")]
    pub id: String,
    #[serde(rename = "@Version")]
    pub version: String,
    #[serde(rename = "@IssueInstant")]
    pub issue_instant: DateTime<Utc>,
    #[serde(rename(serialize = "saml:Issuer", deserialize = "Issuer"))]
    pub issuer: Issuer,
    #[serde(
        rename(serialize = "ds:Signature", deserialize = "Signature"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub signature: Option<Signature>,
    #[serde(
        rename(serialize = "saml:Subject", deserialize = "Subject"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub subject: Option<Subject>,
    #[serde(
        rename(serialize = "saml:Conditions", deserialize = "Conditions"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub conditions: Option<Conditions>,
    #[serde(
        rename(serialize = "saml:AuthnStatement", deserialize = "AuthnStatement"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub authn_statement: Option<AuthnStatement>,
    #[serde(
        rename(
            serialize = "saml:AttributeStatement",
            deserialize = "AttributeStatement"
        ),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub attribute_statement: Option<AttributeStatement>,
}

impl Assertion {
    /// The assertion consumer URL the subject confirmation is bound to.
    pub fn recipient(&self) -> Option<&str> {
        self.subject
            .as_ref()?
            .subject_confirmation
            .as_ref()?
            .subject_confirmation_data
            .as_ref()?
            .recipient
            .as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(
        rename(serialize = "saml:NameID", deserialize = "NameID"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name_id: Option<NameId>,
    #[serde(
        rename(
            serialize = "saml:SubjectConfirmation",
            deserialize = "SubjectConfirmation"
        ),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub subject_confirmation: Option<SubjectConfirmation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    #[serde(
        rename = "@Format",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub format: Option<String>,
    #[serde(
        rename = "@NameQualifier",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name_qualifier: Option<String>,
    #[serde(
        rename = "@SPNameQualifier",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sp_name_qualifier: Option<String>,
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    #[serde(rename = "@Method")]
    pub method: String,
    #[serde(
        rename(
            serialize = "saml:SubjectConfirmationData",
            deserialize = "SubjectConfirmationData"
        ),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub subject_confirmation_data: Option<SubjectConfirmationData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    #[serde(
        rename = "@Address",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub address: Option<String>,
    #[serde(
        rename = "@InResponseTo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub in_response_to: Option<String>,
    #[serde(
        rename = "@NotOnOrAfter",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub not_on_or_after: Option<DateTime<Utc>>,
    #[serde(
        rename = "@Recipient",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recipient: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(
        rename = "@NotBefore",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(
        rename = "@NotOnOrAfter",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub not_on_or_after: Option<DateTime<Utc>>,
    #[serde(
        rename(
            serialize = "saml:AudienceRestriction",
            deserialize = "AudienceRestriction"
        ),
        default
    )]
    pub audience_restrictions: Vec<AudienceRestriction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceRestriction {
    #[serde(
        rename(serialize = "saml:Audience", deserialize = "Audience"),
        default
    )]
    pub audiences: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    #[serde(rename = "@AuthnInstant")]
    pub authn_instant: DateTime<Utc>,
    #[serde(
        rename = "@SessionIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub session_index: Option<String>,
    #[serde(
        rename = "@SessionNotOnOrAfter",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub session_not_on_or_after: Option<DateTime<Utc>>,
    #[serde(rename(serialize = "saml:AuthnContext", deserialize = "AuthnContext"))]
    pub authn_context: AuthnContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnContext {
    #[serde(
        rename(
            serialize = "saml:AuthnContextClassRef",
            deserialize = "AuthnContextClassRef"
        ),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub authn_context_class_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatement {
    #[serde(
        rename(serialize = "saml:Attribute", deserialize = "Attribute"),
        default
    )]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(
        rename = "@NameFormat",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name_format: Option<String>,
    #[serde(
        rename = "@FriendlyName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub friendly_name: Option<String>,
    #[serde(
        rename(serialize = "saml:AttributeValue", deserialize = "AttributeValue"),
        default
    )]
    pub values: Vec<String>,
}

/// Enveloped XML signature as embedded by a signing identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename(serialize = "@xmlns:ds"), skip_deserializing)]
    pub xmlns_ds: SignatureNs,
    #[serde(rename(serialize = "ds:SignedInfo", deserialize = "SignedInfo"))]
    pub signed_info: SignedInfo,
    #[serde(rename(
        serialize = "ds:SignatureValue",
        deserialize = "SignatureValue"
    ))]
    pub signature_value: String,
    #[serde(
        rename(serialize = "ds:KeyInfo", deserialize = "KeyInfo"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub key_info: Option<KeyInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInfo {
    #[serde(rename(
        serialize = "ds:CanonicalizationMethod",
        deserialize = "CanonicalizationMethod"
    ))]
    pub canonicalization_method: Algorithm,
    #[serde(rename(
        serialize = "ds:SignatureMethod",
        deserialize = "SignatureMethod"
    ))]
    pub signature_method: Algorithm,
    #[serde(rename(serialize = "ds:Reference", deserialize = "Reference"))]
    pub reference: Reference,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "@URI")]
    pub uri: String,
    #[serde(
        rename(serialize = "ds:Transforms", deserialize = "Transforms"),
        default
    )]
    pub transforms: Transforms,
    #[serde(rename(serialize = "ds:DigestMethod", deserialize = "DigestMethod"))]
    pub digest_method: Algorithm,
    #[serde(rename(serialize = "ds:DigestValue", deserialize = "DigestValue"))]
    pub digest_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transforms {
    #[serde(
        rename(serialize = "ds:Transform", deserialize = "Transform"),
        default
    )]
    pub transforms: Vec<Algorithm>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Algorithm {
    #[serde(rename = "@Algorithm")]
    pub algorithm: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    #[serde(rename(serialize = "@xmlns:ds"), skip_deserializing)]
    pub xmlns_ds: SignatureNs,
    #[serde(rename(serialize = "ds:X509Data", deserialize = "X509Data"))]
    pub x509_data: X509Data,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509Data {
    #[serde(
        rename(
            serialize = "ds:X509Certificate",
            deserialize = "X509Certificate"
        ),
        default
    )]
    pub certificates: Vec<String>,
}
