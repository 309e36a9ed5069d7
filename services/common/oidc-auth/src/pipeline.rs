use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::claims::{ClaimsVerifier, JwtClaimsVerifier};
use crate::config::AuthConfig;
use crate::error::{AuthError, ResolveError};
use crate::resolver::{KeyResolver, OidcKeyResolver, PublicKey};
use crate::token::DecodedToken;
use crate::trust::{IssuerTrust, RequestContext};
use crate::verdict::VerificationVerdict;

pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// A halted verification: the most specific error, plus the verdict when one
/// exists (undecodable tokens and claim failures) for diagnostics.
#[derive(Debug)]
pub struct VerificationFailure {
    pub error: AuthError,
    pub verdict: Option<VerificationVerdict>,
}

impl VerificationFailure {
    fn halt(error: AuthError) -> Self {
        Self {
            error,
            verdict: None,
        }
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for VerificationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<VerificationFailure> for AuthError {
    fn from(value: VerificationFailure) -> Self {
        value.error
    }
}

#[derive(Clone)]
pub struct TokenVerifier {
    resolver: Arc<dyn KeyResolver>,
    claims: Arc<dyn ClaimsVerifier>,
    resolve_timeout: Duration,
}

impl TokenVerifier {
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            resolver,
            claims: Arc::new(JwtClaimsVerifier::default()),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    /// OIDC-backed verifier using the timeouts, cache and claim settings in `config`.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ResolveError> {
        let resolver = OidcKeyResolver::with_timeout(config.resolve_timeout)?
            .with_cache_ttl(config.jwks_cache_ttl);
        let mut claims = JwtClaimsVerifier::new().with_leeway(config.leeway_seconds);
        if let Some(audience) = &config.audience {
            claims = claims.with_audience(audience.clone());
        }
        Ok(Self::new(Arc::new(resolver))
            .with_claims_verifier(Arc::new(claims))
            .with_resolve_timeout(config.resolve_timeout))
    }

    pub fn with_claims_verifier(mut self, claims: Arc<dyn ClaimsVerifier>) -> Self {
        self.claims = claims;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn resolve_timeout(&self) -> Duration {
        self.resolve_timeout
    }

    /// Decodes and verifies a compact JWS.
    ///
    /// # Errors
    ///
    /// Returns the first failing step. The issuer is checked against `trust`
    /// before any key is resolved.
    pub async fn verify<T>(
        &self,
        raw_token: &str,
        trust: &T,
        ctx: &RequestContext<'_>,
    ) -> Result<VerificationVerdict, VerificationFailure>
    where
        T: IssuerTrust + ?Sized,
    {
        match DecodedToken::decode(raw_token) {
            Ok(token) => self.verify_decoded(token, trust, ctx).await,
            Err(err) => Err(VerificationFailure {
                error: AuthError::MalformedToken(err.clone()),
                verdict: Some(VerificationVerdict::undecodable(err)),
            }),
        }
    }

    pub async fn verify_decoded<T>(
        &self,
        token: DecodedToken,
        trust: &T,
        ctx: &RequestContext<'_>,
    ) -> Result<VerificationVerdict, VerificationFailure>
    where
        T: IssuerTrust + ?Sized,
    {
        if token.has_embedded_key() {
            return Err(VerificationFailure::halt(AuthError::SelfSignedUnsupported));
        }

        let kid = token.key_id().map_err(|err| {
            debug!(error = %err, "token header has no usable kid");
            VerificationFailure::halt(AuthError::MissingKeyId)
        })?;
        let issuer = token.issuer().map_err(|err| {
            debug!(error = %err, "token claims have no usable iss");
            VerificationFailure::halt(AuthError::MissingIssuer)
        })?;

        if !trust.is_trusted(issuer, ctx) {
            return Err(VerificationFailure::halt(AuthError::UntrustedIssuer(
                issuer.to_owned(),
            )));
        }

        let key = self.resolve(kid, issuer).await.map_err(|source| {
            VerificationFailure::halt(AuthError::KeyResolution {
                kid: kid.to_owned(),
                issuer: issuer.to_owned(),
                source,
            })
        })?;

        let errors = self.claims.verify(&key, &token);
        let mut verdict = VerificationVerdict::pending(token);
        if errors.is_empty() {
            verdict.mark_trusted();
            debug!(kid = key.kid(), "verified bearer token");
            return Ok(verdict);
        }

        for err in &errors {
            verdict.record(err.clone());
        }
        Err(VerificationFailure {
            error: AuthError::InvalidClaims(errors),
            verdict: Some(verdict),
        })
    }

    async fn resolve(&self, kid: &str, issuer: &str) -> Result<PublicKey, ResolveError> {
        match tokio::time::timeout(self.resolve_timeout, self.resolver.resolve(kid, issuer)).await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::Timeout(self.resolve_timeout)),
        }
    }
}
