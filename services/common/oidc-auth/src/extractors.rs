use std::convert::Infallible;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::verdict::VerificationVerdict;

/// The verdict attached by [`verify_bearer`](crate::verify_bearer), if any.
///
/// Never rejects. An absent slot and an untrusted verdict both count as
/// unauthenticated.
#[derive(Debug, Clone)]
pub struct MaybeVerdict(pub Option<Arc<VerificationVerdict>>);

impl MaybeVerdict {
    pub fn is_authenticated(&self) -> bool {
        self.0.as_ref().is_some_and(|verdict| verdict.trusted())
    }

    pub fn verdict(&self) -> Option<&VerificationVerdict> {
        self.0.as_deref()
    }

    pub fn into_inner(self) -> Option<Arc<VerificationVerdict>> {
        self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeVerdict
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Arc<VerificationVerdict>>().cloned()))
    }
}

/// A trusted verdict, or a `401 Unauthorized` rejection.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Arc<VerificationVerdict>);

impl Deref for Authenticated {
    type Target = VerificationVerdict;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unauthorized;

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            "Unauthorized",
        )
            .into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Unauthorized;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Arc<VerificationVerdict>>() {
            Some(verdict) if verdict.trusted() => Ok(Self(verdict.clone())),
            _ => Err(Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sign, standard_claims, standard_header};
    use crate::token::DecodedToken;
    use axum::http::Request;

    fn parts_with(verdict: Option<VerificationVerdict>) -> Parts {
        let (mut parts, ()) = Request::builder()
            .uri("/")
            .body(())
            .expect("request")
            .into_parts();
        if let Some(verdict) = verdict {
            parts.extensions.insert(Arc::new(verdict));
        }
        parts
    }

    fn trusted_verdict() -> VerificationVerdict {
        let token = DecodedToken::decode(&sign(standard_header(), standard_claims())).expect("token");
        let mut verdict = VerificationVerdict::pending(token);
        verdict.mark_trusted();
        verdict
    }

    #[tokio::test]
    async fn absent_slot_is_unauthenticated() {
        let mut parts = parts_with(None);
        let MaybeVerdict(verdict) = MaybeVerdict::from_request_parts(&mut parts, &())
            .await
            .expect("infallible");
        assert!(verdict.is_none());

        let rejected = Authenticated::from_request_parts(&mut parts, &()).await;
        assert_eq!(rejected.expect_err("absent"), Unauthorized);
    }

    #[tokio::test]
    async fn untrusted_verdict_is_treated_like_absence() {
        let token = DecodedToken::decode(&sign(standard_header(), standard_claims())).expect("token");
        let mut parts = parts_with(Some(VerificationVerdict::pending(token)));

        let maybe = MaybeVerdict::from_request_parts(&mut parts, &())
            .await
            .expect("infallible");
        assert!(maybe.verdict().is_some());
        assert!(!maybe.is_authenticated());

        let rejected = Authenticated::from_request_parts(&mut parts, &()).await;
        assert_eq!(rejected.expect_err("untrusted"), Unauthorized);
    }

    #[tokio::test]
    async fn trusted_verdict_is_exposed() {
        let mut parts = parts_with(Some(trusted_verdict()));
        let auth = Authenticated::from_request_parts(&mut parts, &())
            .await
            .expect("trusted");
        assert_eq!(auth.subject(), Some("user-1"));
    }
}
