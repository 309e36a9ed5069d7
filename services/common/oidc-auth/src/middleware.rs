use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header::AUTHORIZATION, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, info, warn};

use crate::error::{AuthError, AuthResult, ErrorClass};
use crate::metrics::VerificationMetrics;
use crate::pipeline::TokenVerifier;
use crate::trust::{IssuerTrust, IssuerTrustStore, RequestContext};
use crate::verdict::VerificationVerdict;

const BEARER: &str = "Bearer";

/// How the `Bearer` scheme word is matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BearerScheme {
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

impl BearerScheme {
    fn matches(self, scheme: &str) -> bool {
        match self {
            BearerScheme::CaseSensitive => scheme == BEARER,
            BearerScheme::CaseInsensitive => scheme.eq_ignore_ascii_case(BEARER),
        }
    }
}

/// Per-route-group settings, built once at startup.
#[derive(Clone)]
pub struct VerificationParams {
    issuers: Arc<dyn IssuerTrust>,
    optional: bool,
    scheme: BearerScheme,
}

impl VerificationParams {
    /// A missing `Authorization` header is rejected.
    pub fn required(issuers: Arc<IssuerTrustStore>) -> Self {
        Self::with_trust(issuers, false)
    }

    /// A missing `Authorization` header is forwarded with no verdict attached.
    pub fn optional(issuers: Arc<IssuerTrustStore>) -> Self {
        Self::with_trust(issuers, true)
    }

    /// Uses a custom trust decision instead of a fixed issuer list.
    pub fn with_trust(issuers: Arc<dyn IssuerTrust>, optional: bool) -> Self {
        Self {
            issuers,
            optional,
            scheme: BearerScheme::default(),
        }
    }

    pub fn with_scheme(mut self, scheme: BearerScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn scheme(&self) -> BearerScheme {
        self.scheme
    }
}

/// Middleware state: the shared verifier plus this route group's params.
#[derive(Clone)]
pub struct TokenGate {
    verifier: Arc<TokenVerifier>,
    params: VerificationParams,
    metrics: Option<Arc<VerificationMetrics>>,
}

impl TokenGate {
    pub fn new(verifier: Arc<TokenVerifier>, params: VerificationParams) -> Self {
        Self {
            verifier,
            params,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<VerificationMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn params(&self) -> &VerificationParams {
        &self.params
    }

    /// Runs the header check and the verification pipeline for one request.
    ///
    /// `Ok(None)` means the token was optional and absent. `Ok(Some(_))` is
    /// always a trusted verdict.
    pub async fn check(&self, ctx: &RequestContext<'_>) -> AuthResult<Option<VerificationVerdict>> {
        let token = match parse_bearer(ctx.headers().get(AUTHORIZATION), self.params.scheme)? {
            Some(token) => token,
            None if self.params.optional => return Ok(None),
            None => return Err(AuthError::MissingAuthorization),
        };

        let verdict = self
            .verifier
            .verify(token, self.params.issuers.as_ref(), ctx)
            .await
            .map_err(|failure| {
                if let Some(verdict) = &failure.verdict {
                    debug!(issues = verdict.errors().len(), "verification verdict not trusted");
                }
                failure.error
            })?;

        if !verdict.trusted() {
            return Err(AuthError::UntrustedVerdict);
        }
        Ok(Some(verdict))
    }

    fn record_rejection(&self, err: &AuthError) {
        let class = err.class();
        match class {
            ErrorClass::Resolution => error!(error = %err, class = class.as_str(), "bearer token rejected"),
            ErrorClass::Trust => warn!(error = %err, class = class.as_str(), "bearer token rejected"),
            _ => info!(error = %err, class = class.as_str(), "bearer token rejected"),
        }
        if let Some(metrics) = &self.metrics {
            metrics.rejected(class);
        }
    }
}

/// axum middleware for `middleware::from_fn_with_state(gate, verify_bearer)`.
///
/// On success the verdict is stored in the request extensions as
/// `Arc<VerificationVerdict>`; an optional route with no header gets nothing.
pub async fn verify_bearer(State(gate): State<TokenGate>, mut request: Request, next: Next) -> Response {
    debug!(method = %request.method(), path = %request.uri().path(), "checking bearer token");

    let outcome = {
        let ctx = RequestContext::new(request.method(), request.uri(), request.headers());
        gate.check(&ctx).await
    };

    match outcome {
        Ok(Some(verdict)) => {
            if let Some(metrics) = &gate.metrics {
                metrics.authenticated();
            }
            request.extensions_mut().insert(Arc::new(verdict));
            next.run(request).await
        }
        Ok(None) => {
            if let Some(metrics) = &gate.metrics {
                metrics.anonymous();
            }
            next.run(request).await
        }
        Err(err) => {
            gate.record_rejection(&err);
            err.into_response()
        }
    }
}

/// Splits `Authorization` into scheme and token.
///
/// An absent or empty header is `Ok(None)`. Anything other than exactly one
/// space between a matching scheme word and a non-empty token is rejected.
pub fn parse_bearer(value: Option<&HeaderValue>, scheme: BearerScheme) -> AuthResult<Option<&str>> {
    let Some(value) = value else {
        return Ok(None);
    };
    if value.is_empty() {
        return Ok(None);
    }

    let raw = value.to_str().map_err(|_| AuthError::InvalidAuthorization)?;
    let mut parts = raw.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(word), Some(token), None) if scheme.matches(word) && !token.is_empty() => {
            Ok(Some(token))
        }
        _ => Err(AuthError::InvalidAuthorization),
    }
}
