use axum::{extract::Request, middleware::Next, response::Response};
use http::{HeaderName, HeaderValue};
use tower_http::trace::MakeSpan;
use tracing::{Level, Span};

pub const X_TRACE_ID: HeaderName = HeaderName::from_static("x-trace-id");

/// MakeSpanWithTrace opens one span per request, tagged with the request's
/// trace id so every exchange step logged inside it can be correlated.
#[derive(Debug, Clone, Copy)]
pub struct MakeSpanWithTrace {
    level: Level,
}

impl MakeSpanWithTrace {
    pub fn new() -> Self {
        Self {
            level: Level::DEBUG,
        }
    }

    /// Defaults to [`Level::DEBUG`].
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl Default for MakeSpanWithTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> MakeSpan<B> for MakeSpanWithTrace {
    fn make_span(&mut self, request: &http::Request<B>) -> Span {
        let trace_id = request
            .headers()
            .get(X_TRACE_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        // tracing::span! wants a constant level.
        macro_rules! make_span {
            ($level:expr) => {
                tracing::span!(
                    $level,
                    "request",
                    trace_id = %trace_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            };
        }

        match self.level {
            Level::ERROR => make_span!(Level::ERROR),
            Level::WARN => make_span!(Level::WARN),
            Level::INFO => make_span!(Level::INFO),
            Level::DEBUG => make_span!(Level::DEBUG),
            Level::TRACE => make_span!(Level::TRACE),
        }
    }
}

/// Keep the caller's X-Trace-Id or mint one, and echo it on the response.
pub async fn trace_id(mut request: Request, next: Next) -> Response {
    let value = match request.headers().get(X_TRACE_ID) {
        Some(v) => v.clone(),
        None => {
            let generated = HeaderValue::from_str(
                &uuid::Uuid::new_v4().hyphenated().to_string(),
            );
            match generated {
                Ok(v) => {
                    request.headers_mut().insert(X_TRACE_ID, v.clone());
                    v
                }
                Err(_) => return next.run(request).await,
            }
        }
    };
    let mut response = next.run(request).await;
    response.headers_mut().insert(X_TRACE_ID, value);
    response
}
