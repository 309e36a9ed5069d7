use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use common_oidc_auth::{
    IssuerTrustStore, PublicKey, StaticKeyResolver, TokenVerifier, VerificationMetrics,
};
use hello_service::build_router;
use http_body_util::BodyExt;
use jsonwebtoken::{crypto, Algorithm, EncodingKey};
use serde_json::{json, Value};
use tower::ServiceExt;

const PRIVATE_PEM: &str = include_str!("../../common/oidc-auth/tests/fixtures/rsa_private.pem");
const PUBLIC_PEM: &str = include_str!("../../common/oidc-auth/tests/fixtures/rsa_public.pem");
const ISSUER: &str = "https://issuer.example/";
const KID: &str = "test-key";

fn sign(claims: Value) -> String {
    let header = json!({"alg": "RS256", "typ": "JWT", "kid": KID});
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("header"));
    let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims"));
    let input = format!("{header}.{claims}");
    let key = EncodingKey::from_rsa_pem(PRIVATE_PEM.as_bytes()).expect("private key");
    let signature = crypto::sign(input.as_bytes(), &key, Algorithm::RS256).expect("sign");
    format!("Bearer {input}.{signature}")
}

fn claims_for(subject: Option<&str>) -> Value {
    let now = chrono::Utc::now().timestamp();
    let mut claims = json!({"iss": ISSUER, "iat": now, "exp": now + 600});
    if let Some(subject) = subject {
        claims["sub"] = json!(subject);
    }
    claims
}

fn app() -> Router {
    let key = PublicKey::from_rsa_pem(KID, PUBLIC_PEM.as_bytes()).expect("public key");
    let resolver = StaticKeyResolver::new().with_key(ISSUER, key);
    let verifier = Arc::new(TokenVerifier::new(Arc::new(resolver)));
    let issuers = Arc::new(IssuerTrustStore::from_lists(ISSUER, "").expect("issuers"));
    let metrics = Arc::new(VerificationMetrics::new().expect("metrics"));
    build_router(verifier, issuers, Some(metrics))
}

async fn call(app: &Router, method: &str, uri: &str, auth: Option<&str>) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = auth {
        builder = builder.header("Authorization", value);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
}

#[tokio::test]
async fn hello_is_open_to_anonymous_callers() {
    let app = app();
    let (status, body) = call(&app, "POST", "/api/hello", None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body, json!({"message": "Hello, World!", "authenticated": false}));
}

#[tokio::test]
async fn hello_reports_authenticated_callers() {
    let app = app();
    let token = sign(claims_for(Some("user-1")));
    let (status, body) = call(&app, "POST", "/api/hello", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body["authenticated"], json!(true));
}

#[tokio::test]
async fn profile_requires_a_token() {
    let app = app();
    let (status, _) = call(&app, "POST", "/api/users/profile", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let token = sign(claims_for(Some("user-1")));
    let (status, body) = call(&app, "POST", "/api/users/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body, json!({"user_id": "user-1"}));
}

#[tokio::test]
async fn profile_without_subject_is_unauthorized() {
    let app = app();
    let token = sign(claims_for(None));
    let (status, body) = call(&app, "POST", "/api/users/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Unauthorized");
}

#[tokio::test]
async fn health_and_metrics_are_served() {
    let app = app();
    let (status, body) = call(&app, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    call(&app, "POST", "/api/hello", None).await;
    let (status, body) = call(&app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("oidc_auth_requests_total{outcome=\"anonymous\"} 1"));
}
