use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{crypto, Algorithm, EncodingKey};
use serde_json::{json, Value};

use crate::error::ResolveError;
use crate::resolver::{KeyResolver, PublicKey};

pub(crate) const PRIVATE_PEM: &str = include_str!("../tests/fixtures/rsa_private.pem");
pub(crate) const PUBLIC_PEM: &str = include_str!("../tests/fixtures/rsa_public.pem");
pub(crate) const MODULUS: &str = include_str!("../tests/fixtures/rsa_modulus.b64u");
pub(crate) const EXPONENT: &str = "AQAB";
pub(crate) const KID: &str = "test-key";
pub(crate) const ISSUER: &str = "https://issuer.example/";

pub(crate) fn now() -> i64 {
    Utc::now().timestamp()
}

pub(crate) fn public_key() -> PublicKey {
    PublicKey::from_rsa_pem(KID, PUBLIC_PEM.as_bytes()).expect("fixture public key")
}

pub(crate) fn standard_header() -> Value {
    json!({"alg": "RS256", "typ": "JWT", "kid": KID})
}

pub(crate) fn standard_claims() -> Value {
    let issued_at = now();
    json!({
        "iss": ISSUER,
        "sub": "user-1",
        "iat": issued_at,
        "exp": issued_at + 600,
    })
}

/// Signs arbitrary header and claims JSON with the fixture key (RS256).
pub(crate) fn sign(header: Value, claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("header json"));
    let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims json"));
    let input = format!("{header}.{claims}");
    let key = EncodingKey::from_rsa_pem(PRIVATE_PEM.as_bytes()).expect("fixture private key");
    let signature = crypto::sign(input.as_bytes(), &key, Algorithm::RS256).expect("sign");
    format!("{input}.{signature}")
}

/// Wraps a resolver and counts how often it is asked for a key.
pub(crate) struct CountingResolver<R> {
    inner: R,
    calls: AtomicUsize,
}

impl<R> CountingResolver<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R: KeyResolver> KeyResolver for CountingResolver<R> {
    async fn resolve(&self, kid: &str, issuer: &str) -> Result<PublicKey, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(kid, issuer).await
    }
}
