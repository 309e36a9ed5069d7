use serde_json::Value;
use thiserror::Error;

use crate::claims::ClaimError;
use crate::token::{DecodeError, DecodedToken, JsonObject};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationIssue {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Claim(#[from] ClaimError),
}

/// Outcome of one verification attempt.
///
/// Only [`TokenVerifier`](crate::TokenVerifier) builds verdicts, and `trusted`
/// is set only once every step has passed with no recorded issues.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationVerdict {
    token: Option<DecodedToken>,
    trusted: bool,
    errors: Vec<VerificationIssue>,
}

impl VerificationVerdict {
    pub(crate) fn pending(token: DecodedToken) -> Self {
        Self {
            token: Some(token),
            trusted: false,
            errors: Vec::new(),
        }
    }

    pub(crate) fn undecodable(error: DecodeError) -> Self {
        Self {
            token: None,
            trusted: false,
            errors: vec![error.into()],
        }
    }

    pub(crate) fn record(&mut self, issue: impl Into<VerificationIssue>) {
        self.trusted = false;
        self.errors.push(issue.into());
    }

    pub(crate) fn mark_trusted(&mut self) {
        self.trusted = self.token.is_some() && self.errors.is_empty();
    }

    pub fn trusted(&self) -> bool {
        self.trusted
    }

    pub fn errors(&self) -> &[VerificationIssue] {
        &self.errors
    }

    /// The decoded token, absent only when decoding itself failed.
    pub fn token(&self) -> Option<&DecodedToken> {
        self.token.as_ref()
    }

    pub fn header(&self) -> Option<&JsonObject> {
        self.token.as_ref().map(DecodedToken::header)
    }

    pub fn claims(&self) -> Option<&JsonObject> {
        self.token.as_ref().map(DecodedToken::claims)
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims().and_then(|claims| claims.get(name))
    }

    pub fn subject(&self) -> Option<&str> {
        self.token.as_ref().and_then(|token| token.subject().ok())
    }

    pub fn issuer(&self) -> Option<&str> {
        self.token.as_ref().and_then(|token| token.issuer().ok())
    }
}
