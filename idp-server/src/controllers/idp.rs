use axum::{
    extract::{Query, Request},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::info;

use idp_slo::{errors, Result};

use crate::AppState;

pub fn new_router(state: AppState) -> Router {
    Router::new()
        .route("/metadata", get(metadata))
        .route("/sso", get(sso))
        .route("/login", get(login))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct LoginParams {
    #[serde(default)]
    sp: String,
    #[serde(rename = "RelayState", default)]
    relay_state: String,
}

async fn metadata(app: AppState) -> Response {
    app.middleware.serve_metadata().await
}

async fn sso(app: AppState, req: Request) -> Response {
    app.middleware
        .serve_sso(app.authenticator.as_ref(), req)
        .await
}

/// IdP-initiated login toward a configured service provider.
async fn login(
    app: AppState,
    Query(params): Query<LoginParams>,
    req: Request,
) -> Result<Response> {
    if params.sp.is_empty() {
        return Err(errors::bad_request("missing sp"));
    }
    let url = app.sp_metadata_url(&params.sp).ok_or_else(|| {
        errors::not_found(&format!("no metadata url for {}", params.sp))
    })?;
    info!("idp initiated login to {}", params.sp);
    let login = app
        .middleware
        .new_login_request(url, app.authenticator.clone())
        .await?;
    Ok(login.serve(req, params.relay_state).await)
}
