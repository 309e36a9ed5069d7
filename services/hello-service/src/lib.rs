use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common_oidc_auth::{
    verify_bearer, Authenticated, IssuerTrustStore, MaybeVerdict, TokenGate, TokenVerifier,
    Unauthorized, VerificationMetrics, VerificationParams,
};
use serde::Serialize;
use tracing::error;

pub const DEFAULT_ISSUER: &str = "https://therootcompany.github.io/libauth/";

#[derive(Debug, Serialize)]
pub struct HelloResponse {
    pub message: &'static str,
    pub authenticated: bool,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user_id: String,
}

async fn health() -> &'static str {
    "ok"
}

async fn hello(verdict: MaybeVerdict) -> Json<HelloResponse> {
    Json(HelloResponse {
        message: "Hello, World!",
        authenticated: verdict.is_authenticated(),
    })
}

async fn profile(auth: Authenticated) -> Result<Json<ProfileResponse>, Unauthorized> {
    let user_id = auth.subject().ok_or(Unauthorized)?;
    Ok(Json(ProfileResponse {
        user_id: user_id.to_owned(),
    }))
}

async fn render_metrics(State(metrics): State<Arc<VerificationMetrics>>) -> Response {
    match metrics.render() {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `/api/hello` accepts anonymous callers; `/api/users/profile` needs a trusted token.
pub fn build_router(
    verifier: Arc<TokenVerifier>,
    issuers: Arc<IssuerTrustStore>,
    metrics: Option<Arc<VerificationMetrics>>,
) -> Router {
    let mut optional = TokenGate::new(verifier.clone(), VerificationParams::optional(issuers.clone()));
    let mut required = TokenGate::new(verifier, VerificationParams::required(issuers));
    if let Some(metrics) = &metrics {
        optional = optional.with_metrics(metrics.clone());
        required = required.with_metrics(metrics.clone());
    }

    let public_routes = Router::new()
        .route("/api/hello", post(hello))
        .route_layer(from_fn_with_state(optional, verify_bearer));
    let user_routes = Router::new()
        .route("/api/users/profile", post(profile))
        .route_layer(from_fn_with_state(required, verify_bearer));

    let mut app = Router::new()
        .route("/healthz", get(health))
        .merge(public_routes)
        .merge(user_routes);

    if let Some(metrics) = metrics {
        app = app.merge(
            Router::new()
                .route("/metrics", get(render_metrics))
                .with_state(metrics),
        );
    }
    app
}
