use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use http::{header::CONTENT_TYPE, Uri};
use prometheus::{Encoder, TextEncoder};
use tower::ServiceBuilder;
use tower_http::{
    trace::{DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::Level;

use idp_slo::{errors, Result};

use crate::{
    controllers::idp,
    middlewares::{self as mw, MakeSpanWithTrace},
    var::{HTTP_REQUESTS_DURATION_SECONDS, HTTP_REQUESTS_TOTAL},
    AppState,
};

pub struct AppRouter;

impl AppRouter {
    pub fn build(state: AppState) -> Router {
        Router::new()
            .merge(idp::new_router(state))
            .layer(
                ServiceBuilder::new().layer(
                    TraceLayer::new_for_http()
                        .make_span_with(
                            MakeSpanWithTrace::new().level(Level::INFO),
                        )
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(LatencyUnit::Millis),
                        ),
                ),
            )
            .layer(middleware::from_fn(mw::trace_id))
            .fallback(Self::not_found)
            .route_layer(middleware::from_fn(Self::track_metrics))
            .route("/metrics", get(Self::metrics))
    }

    async fn track_metrics(request: Request, next: Next) -> impl IntoResponse {
        let path = if let Some(matched_path) =
            request.extensions().get::<MatchedPath>()
        {
            matched_path.as_str().to_owned()
        } else {
            request.uri().path().to_owned()
        };
        let start = Instant::now();
        let method = request.method().to_string();
        let response = next.run(request).await;
        let latency = start.elapsed();

        let labels = [method.as_str(), path.as_str()];
        HTTP_REQUESTS_TOTAL.with_label_values(&labels).inc();
        HTTP_REQUESTS_DURATION_SECONDS
            .with_label_values(&labels)
            .observe(latency.as_secs_f64());

        response
    }

    async fn metrics() -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(errors::any)?;

        Ok(([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], buffer).into_response())
    }

    async fn not_found(uri: Uri) -> impl IntoResponse {
        errors::not_found(&format!("no route for {}", uri))
    }
}
