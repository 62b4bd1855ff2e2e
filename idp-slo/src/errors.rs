use std::{error::Error as StdError, fmt};

use backtrace::Backtrace;
use http::StatusCode;
use thiserror::Error;

pub trait ErrorCode: StdError + 'static {
    fn code(&self) -> (StatusCode, &'static str);
}

#[derive(Error, Debug)]
pub enum Code {
    #[error(transparent)]
    Any(#[from] anyhow::Error),
    #[error("Not found. {0}")]
    NotFound(String),
    #[error("Authentication is required to access this resource")]
    Unauthorized,
    #[error("Please recheck the request.see: {0}")]
    BadRequest(String),
    #[error("Malformed SAMLRequest encoding. {0}")]
    Decode(String),
    #[error("Malformed SAMLRequest compression. {0}")]
    Inflate(String),
    #[error("Malformed SAMLRequest document. {0}")]
    XmlParse(String),
    #[error("Assertion rejected. {0}")]
    Assertion(String),
    #[error("Serialization failed. {0}")]
    Marshal(String),
    #[error("Template rendering failed. {0}")]
    Template(String),
    #[error("Metadata generation failed. {0}")]
    MetadataGeneration(String),
    #[error("Metadata fetch failed. {0}")]
    MetadataFetch(String),
}

impl ErrorCode for Code {
    fn code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Any(_) => (StatusCode::INTERNAL_SERVER_ERROR, "1010001"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "1010002"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "1010003"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "1010006"),
            Self::Decode(_) => (StatusCode::BAD_REQUEST, "1020001"),
            Self::Inflate(_) => (StatusCode::BAD_REQUEST, "1020002"),
            Self::XmlParse(_) => (StatusCode::BAD_REQUEST, "1020003"),
            Self::Assertion(_) => (StatusCode::FORBIDDEN, "1020004"),
            Self::Marshal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "1020005"),
            Self::Template(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "1020006")
            }
            Self::MetadataGeneration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "1020007")
            }
            Self::MetadataFetch(_) => (StatusCode::BAD_GATEWAY, "1020008"),
        }
    }
}

pub struct WithBacktrace {
    source: Code,
    backtrace: Backtrace,
}

impl WithBacktrace {
    pub fn code(&self) -> &Code {
        &self.source
    }
}

impl fmt::Debug for WithBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithBacktrace")
            .field("source", &self.source)
            .field("backtrace", &self.backtrace)
            .finish()
    }
}

impl fmt::Display for WithBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl StdError for WithBacktrace {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

impl From<Code> for WithBacktrace {
    fn from(code: Code) -> Self {
        WithBacktrace {
            source: code,
            backtrace: Backtrace::new(),
        }
    }
}

impl From<WithBacktrace> for Code {
    fn from(value: WithBacktrace) -> Self {
        value.source
    }
}

impl PartialEq for WithBacktrace {
    fn eq(&self, other: &Self) -> bool {
        let (_, src_code) = self.source.code();
        let (_, dst_code) = other.source.code();
        src_code == dst_code
    }
}

#[inline]
pub fn any<E: StdError>(err: E) -> WithBacktrace {
    Code::Any(anyhow::anyhow!("{}", err.to_string())).into()
}

#[inline]
pub fn anyhow(err: anyhow::Error) -> WithBacktrace {
    Code::Any(err).into()
}

#[inline]
pub fn not_found<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::NotFound(err.to_string()).into()
}

#[inline]
pub fn unauthorized() -> WithBacktrace {
    Code::Unauthorized.into()
}

#[inline]
pub fn bad_request<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::BadRequest(err.to_string()).into()
}

#[inline]
pub fn decode<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::Decode(err.to_string()).into()
}

#[inline]
pub fn inflate<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::Inflate(err.to_string()).into()
}

#[inline]
pub fn xml_parse<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::XmlParse(err.to_string()).into()
}

#[inline]
pub fn assertion<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::Assertion(err.to_string()).into()
}

#[inline]
pub fn marshal<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::Marshal(err.to_string()).into()
}

#[inline]
pub fn template<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::Template(err.to_string()).into()
}

#[inline]
pub fn metadata_generation<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::MetadataGeneration(err.to_string()).into()
}

#[inline]
pub fn metadata_fetch<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::MetadataFetch(err.to_string()).into()
}

#[cfg(feature = "axum-resp")]
mod axum {
    use axum::response::IntoResponse;
    use serde_json::json;

    use super::ErrorCode;

    impl IntoResponse for super::WithBacktrace {
        fn into_response(self) -> axum::response::Response {
            tracing::error!("{:?}", self);

            let (status_code, code) = self.source.code();

            // Protocol detail stays in the log; the SP or browser only
            // learns the status class.
            let payload = json!({
                "code": code,
                "message": status_code.canonical_reason().unwrap_or_default(),
            });

            (status_code, axum::Json(payload)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_status() {
        assert_eq!(
            decode("bad").code().code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            assertion("unknown issuer").code().code().0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            metadata_fetch("timeout").code().code().0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(marshal("x"), marshal("y"));
        assert_ne!(inflate("x"), xml_parse("x"));
    }

    #[test]
    fn display_keeps_cause() {
        let err = inflate("unexpected end of deflate stream");
        assert_eq!(
            err.to_string(),
            "Malformed SAMLRequest compression. unexpected end of deflate stream"
        );
        assert!(matches!(Code::from(err), Code::Inflate(_)));
    }
}
