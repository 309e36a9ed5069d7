#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use common_oidc_auth::{KeyResolver, PublicKey, ResolveError, StaticKeyResolver};
use http_body_util::BodyExt;
use jsonwebtoken::{crypto, Algorithm, EncodingKey};
use serde_json::{json, Value};

pub const PRIVATE_PEM: &str = include_str!("../fixtures/rsa_private.pem");
pub const PUBLIC_PEM: &str = include_str!("../fixtures/rsa_public.pem");
pub const MODULUS: &str = include_str!("../fixtures/rsa_modulus.b64u");
pub const EXPONENT: &str = "AQAB";
pub const KID: &str = "test-key";
pub const ISSUER: &str = "https://issuer.example/";

pub fn now() -> i64 {
    Utc::now().timestamp()
}

pub fn header() -> Value {
    json!({"alg": "RS256", "typ": "JWT", "kid": KID})
}

pub fn claims() -> Value {
    let issued_at = now();
    json!({
        "iss": ISSUER,
        "sub": "user-1",
        "iat": issued_at,
        "exp": issued_at + 600,
    })
}

pub fn sign(header: Value, claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("header json"));
    let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims json"));
    let input = format!("{header}.{claims}");
    let key = EncodingKey::from_rsa_pem(PRIVATE_PEM.as_bytes()).expect("fixture private key");
    let signature = crypto::sign(input.as_bytes(), &key, Algorithm::RS256).expect("sign");
    format!("{input}.{signature}")
}

pub fn valid_token() -> String {
    sign(header(), claims())
}

pub fn public_key() -> PublicKey {
    PublicKey::from_rsa_components(KID, MODULUS.trim(), EXPONENT).expect("fixture key")
}

/// Static resolver knowing the fixture key, wrapped so calls can be counted.
pub fn counting_resolver() -> Arc<CountingResolver> {
    Arc::new(CountingResolver::new(Arc::new(
        StaticKeyResolver::new().with_key(ISSUER, public_key()),
    )))
}

pub struct CountingResolver {
    inner: Arc<dyn KeyResolver>,
    calls: AtomicUsize,
}

impl CountingResolver {
    pub fn new(inner: Arc<dyn KeyResolver>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyResolver for CountingResolver {
    async fn resolve(&self, kid: &str, issuer: &str) -> Result<PublicKey, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(kid, issuer).await
    }
}

pub fn post(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(value) = authorization {
        builder = builder.header("Authorization", value);
    }
    builder.body(Body::from("payload")).expect("request")
}

pub async fn read_body(response: Response<Body>) -> (StatusCode, String) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
}
