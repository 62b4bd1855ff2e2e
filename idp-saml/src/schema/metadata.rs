use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{KeyInfo, MetadataNs, XmlRoot, HTTP_POST_BINDING};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    #[serde(rename(serialize = "@xmlns:md"), skip_deserializing)]
    pub xmlns_md: MetadataNs,
    #[serde(rename = "@entityID")]
    pub entity_id: String,
    #[serde(
        rename = "@validUntil",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(
        rename = "@cacheDuration",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_duration: Option<String>,
    #[serde(
        rename(
            serialize = "md:IDPSSODescriptor",
            deserialize = "IDPSSODescriptor"
        ),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub idp_sso_descriptor: Option<IdpSsoDescriptor>,
    #[serde(
        rename(serialize = "md:SPSSODescriptor", deserialize = "SPSSODescriptor"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sp_sso_descriptor: Option<SpSsoDescriptor>,
}

impl XmlRoot for EntityDescriptor {
    const ROOT: &'static str = "md:EntityDescriptor";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpSsoDescriptor {
    #[serde(rename = "@protocolSupportEnumeration")]
    pub protocol_support_enumeration: String,
    #[serde(
        rename = "@WantAuthnRequestsSigned",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub want_authn_requests_signed: Option<bool>,
    #[serde(
        rename(serialize = "md:KeyDescriptor", deserialize = "KeyDescriptor"),
        default
    )]
    pub key_descriptors: Vec<KeyDescriptor>,
    #[serde(
        rename(serialize = "md:NameIDFormat", deserialize = "NameIDFormat"),
        default
    )]
    pub name_id_formats: Vec<String>,
    #[serde(
        rename(
            serialize = "md:SingleSignOnService",
            deserialize = "SingleSignOnService"
        ),
        default
    )]
    pub single_sign_on_services: Vec<Endpoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpSsoDescriptor {
    #[serde(rename = "@protocolSupportEnumeration")]
    pub protocol_support_enumeration: String,
    #[serde(
        rename = "@AuthnRequestsSigned",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub authn_requests_signed: Option<bool>,
    #[serde(
        rename = "@WantAssertionsSigned",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub want_assertions_signed: Option<bool>,
    #[serde(
        rename(serialize = "md:KeyDescriptor", deserialize = "KeyDescriptor"),
        default
    )]
    pub key_descriptors: Vec<KeyDescriptor>,
    #[serde(
        rename(serialize = "md:NameIDFormat", deserialize = "NameIDFormat"),
        default
    )]
    pub name_id_formats: Vec<String>,
    #[serde(
        rename(
            serialize = "md:AssertionConsumerService",
            deserialize = "AssertionConsumerService"
        ),
        default
    )]
    pub assertion_consumer_services: Vec<IndexedEndpoint>,
}

impl SpSsoDescriptor {
    /// The HTTP-POST consumer a response should go to: the one flagged as
    /// default, otherwise the lowest index.
    pub fn post_assertion_consumer_service(&self) -> Option<&IndexedEndpoint> {
        let mut lowest: Option<&IndexedEndpoint> = None;
        for acs in self
            .assertion_consumer_services
            .iter()
            .filter(|acs| acs.binding == HTTP_POST_BINDING)
        {
            if acs.is_default == Some(true) {
                return Some(acs);
            }
            if lowest.map_or(true, |current| acs.index < current.index) {
                lowest = Some(acs);
            }
        }
        lowest
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    #[serde(rename = "@use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(rename(serialize = "ds:KeyInfo", deserialize = "KeyInfo"))]
    pub key_info: KeyInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "@Binding")]
    pub binding: String,
    #[serde(rename = "@Location")]
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedEndpoint {
    #[serde(rename = "@Binding")]
    pub binding: String,
    #[serde(rename = "@Location")]
    pub location: String,
    #[serde(rename = "@index")]
    pub index: u32,
    #[serde(
        rename = "@isDefault",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_default: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acs(binding: &str, index: u32, is_default: Option<bool>) -> IndexedEndpoint {
        IndexedEndpoint {
            binding: binding.to_owned(),
            location: format!("https://sp.example.com/acs/{index}"),
            index,
            is_default,
        }
    }

    #[test]
    fn post_acs_prefers_default_then_lowest_index() {
        let mut sp = SpSsoDescriptor {
            assertion_consumer_services: vec![
                acs(HTTP_POST_BINDING, 3, None),
                acs(super::super::HTTP_REDIRECT_BINDING, 0, None),
                acs(HTTP_POST_BINDING, 1, None),
            ],
            ..Default::default()
        };
        assert_eq!(sp.post_assertion_consumer_service().unwrap().index, 1);

        sp.assertion_consumer_services
            .push(acs(HTTP_POST_BINDING, 7, Some(true)));
        assert_eq!(sp.post_assertion_consumer_service().unwrap().index, 7);

        sp.assertion_consumer_services.clear();
        assert!(sp.post_assertion_consumer_service().is_none());
    }
}
