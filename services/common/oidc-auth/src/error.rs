use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::claims::ClaimError;
use crate::token::DecodeError;

pub type AuthResult<T> = Result<T, AuthError>;

/// Coarse failure category, used for log levels and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    ClientFormat,
    Structural,
    Trust,
    Resolution,
    Claims,
    Unsupported,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::ClientFormat => "client_format",
            ErrorClass::Structural => "structural",
            ErrorClass::Trust => "trust",
            ErrorClass::Resolution => "resolution",
            ErrorClass::Claims => "claims",
            ErrorClass::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingAuthorization,
    #[error("expected Authorization header to be in the format of 'Bearer <Token>'")]
    InvalidAuthorization,
    #[error("bad request: bearer token could not be parsed: {0}")]
    MalformedToken(DecodeError),
    #[error("bad request: missing 'kid' identifier")]
    MissingKeyId,
    #[error("bad request: self-signed tokens with 'jwk' are not supported")]
    SelfSignedUnsupported,
    #[error("bad request: 'payload.iss' must exist to complement 'header.kid'")]
    MissingIssuer,
    #[error("unauthorized: 'iss' ({0}) is not a trusted issuer")]
    UntrustedIssuer(String),
    #[error("bad request: 'kid' could not be matched to a known public key: {source}")]
    KeyResolution {
        kid: String,
        issuer: String,
        #[source]
        source: ResolveError,
    },
    #[error("invalid jwt:{}", join_claim_errors(.0))]
    InvalidClaims(Vec<ClaimError>),
    #[error("bad token signature")]
    UntrustedVerdict,
}

impl AuthError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => {
                ErrorClass::ClientFormat
            }
            AuthError::MalformedToken(_) | AuthError::MissingKeyId | AuthError::MissingIssuer => {
                ErrorClass::Structural
            }
            AuthError::UntrustedIssuer(_) => ErrorClass::Trust,
            AuthError::KeyResolution { .. } => ErrorClass::Resolution,
            AuthError::InvalidClaims(_) | AuthError::UntrustedVerdict => ErrorClass::Claims,
            AuthError::SelfSignedUnsupported => ErrorClass::Unsupported,
        }
    }

    fn response_body(&self) -> String {
        match self {
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => {
                format!("Bad Format: {self}")
            }
            AuthError::UntrustedVerdict => "Bad Token Signature".to_string(),
            _ => format!("Invalid Token: {self}\n"),
        }
    }
}

fn join_claim_errors(errors: &[ClaimError]) -> String {
    errors
        .iter()
        .map(|err| format!("\n\t{err}"))
        .collect::<String>()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            self.response_body(),
        )
            .into_response()
    }
}

/// Failures from looking up a public key for `(kid, issuer)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("failed to fetch {url}: {message}")]
    Http { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("failed to parse response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("discovery document at {0} has no jwks_uri")]
    MissingJwksUri(String),
    #[error("no key '{kid}' published by {issuer}")]
    UnknownKeyId { kid: String, issuer: String },
    #[error("key '{kid}' uses unsupported key type '{kty}'")]
    UnsupportedKey { kid: String, kty: String },
    #[error("failed to parse key '{kid}': {message}")]
    KeyParse { kid: String, message: String },
    #[error("key resolution timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustStoreError {
    #[error("issuer '{issuer}' is not a valid URL: {message}")]
    InvalidUrl { issuer: String, message: String },
    #[error("public issuer '{0}' must use https")]
    InsecureIssuer(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {name}: {message}")]
    Invalid {
        name: String,
        value: String,
        message: String,
    },
    #[error(transparent)]
    TrustStore(#[from] TrustStoreError),
    #[error("failed to build key resolver: {0}")]
    Resolver(#[from] ResolveError),
}
