use std::str::FromStr;

use chrono::Utc;
use jsonwebtoken::{crypto, Algorithm};
use serde_json::Value;
use thiserror::Error;

use crate::resolver::{KeyType, PublicKey};
use crate::token::{DecodedToken, FieldError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("'alg' header is missing")]
    MissingAlgorithm,
    #[error("unsupported signing algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("algorithm '{alg}' cannot be used with key '{kid}'")]
    AlgorithmMismatch { alg: String, kid: String },
    #[error("signature does not match")]
    BadSignature,
    #[error("'exp' is missing")]
    MissingExpiry,
    #[error("'{0}' must be a numeric date")]
    InvalidClaimType(&'static str),
    #[error("token expired at {0}")]
    Expired(i64),
    #[error("token is not valid before {0}")]
    NotYetValid(i64),
    #[error("token was issued in the future ({0})")]
    IssuedInFuture(i64),
    #[error("audience does not include '{0}'")]
    AudienceMismatch(String),
}

/// Cryptographic and semantic checks on a token once its key is known.
pub trait ClaimsVerifier: Send + Sync {
    /// Returns every failed check; an empty list means the token is valid.
    fn verify(&self, key: &PublicKey, token: &DecodedToken) -> Vec<ClaimError>;
}

#[derive(Debug, Clone)]
pub struct JwtClaimsVerifier {
    leeway_seconds: u64,
    audience: Option<String>,
    require_exp: bool,
}

impl Default for JwtClaimsVerifier {
    fn default() -> Self {
        Self {
            leeway_seconds: 0,
            audience: None,
            require_exp: true,
        }
    }
}

impl JwtClaimsVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn require_exp(mut self, required: bool) -> Self {
        self.require_exp = required;
        self
    }

    /// Runs every check against a fixed `now` (seconds since the epoch).
    pub fn verify_at(&self, key: &PublicKey, token: &DecodedToken, now: i64) -> Vec<ClaimError> {
        let mut errors = Vec::new();
        self.check_signature(key, token, &mut errors);
        self.check_times(token, now, &mut errors);
        self.check_audience(token, &mut errors);
        errors
    }

    fn check_signature(&self, key: &PublicKey, token: &DecodedToken, errors: &mut Vec<ClaimError>) {
        let name = match token.algorithm() {
            Ok(name) => name,
            Err(FieldError::Missing(_)) => {
                errors.push(ClaimError::MissingAlgorithm);
                return;
            }
            Err(_) => {
                errors.push(ClaimError::UnsupportedAlgorithm(
                    token.header().get("alg").map(Value::to_string).unwrap_or_default(),
                ));
                return;
            }
        };

        let Some((alg, family)) = Algorithm::from_str(name)
            .ok()
            .and_then(|alg| key_type_for(alg).map(|family| (alg, family)))
        else {
            errors.push(ClaimError::UnsupportedAlgorithm(name.to_owned()));
            return;
        };

        if family != key.key_type() || key.algorithm().is_some_and(|pinned| pinned != alg) {
            errors.push(ClaimError::AlgorithmMismatch {
                alg: name.to_owned(),
                kid: key.kid().to_owned(),
            });
            return;
        }

        let valid = crypto::verify(
            token.encoded_signature(),
            token.signing_input().as_bytes(),
            key.decoding_key(),
            alg,
        )
        .unwrap_or(false);
        if !valid {
            errors.push(ClaimError::BadSignature);
        }
    }

    fn check_times(&self, token: &DecodedToken, now: i64, errors: &mut Vec<ClaimError>) {
        let leeway = i64::try_from(self.leeway_seconds).unwrap_or(i64::MAX);

        match token.numeric_claim("exp") {
            Ok(Some(exp)) if exp.saturating_add(leeway) < now => {
                errors.push(ClaimError::Expired(exp));
            }
            Ok(Some(_)) => {}
            Ok(None) if self.require_exp => errors.push(ClaimError::MissingExpiry),
            Ok(None) => {}
            Err(_) => errors.push(ClaimError::InvalidClaimType("exp")),
        }

        match token.numeric_claim("nbf") {
            Ok(Some(nbf)) if nbf > now.saturating_add(leeway) => {
                errors.push(ClaimError::NotYetValid(nbf));
            }
            Ok(_) => {}
            Err(_) => errors.push(ClaimError::InvalidClaimType("nbf")),
        }

        match token.numeric_claim("iat") {
            Ok(Some(iat)) if iat > now.saturating_add(leeway) => {
                errors.push(ClaimError::IssuedInFuture(iat));
            }
            Ok(_) => {}
            Err(_) => errors.push(ClaimError::InvalidClaimType("iat")),
        }
    }

    fn check_audience(&self, token: &DecodedToken, errors: &mut Vec<ClaimError>) {
        let Some(expected) = self.audience.as_deref() else {
            return;
        };
        let matches = match token.claims().get("aud") {
            Some(Value::String(aud)) => aud == expected,
            Some(Value::Array(values)) => values.iter().any(|value| value.as_str() == Some(expected)),
            _ => false,
        };
        if !matches {
            errors.push(ClaimError::AudienceMismatch(expected.to_owned()));
        }
    }
}

impl ClaimsVerifier for JwtClaimsVerifier {
    fn verify(&self, key: &PublicKey, token: &DecodedToken) -> Vec<ClaimError> {
        self.verify_at(key, token, Utc::now().timestamp())
    }
}

/// Key family an asymmetric algorithm needs. Symmetric and unsupported
/// algorithms map to `None`.
fn key_type_for(alg: Algorithm) -> Option<KeyType> {
    match alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Some(KeyType::Rsa),
        Algorithm::ES256 | Algorithm::ES384 => Some(KeyType::Ec),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{now, public_key, sign, standard_claims, standard_header, KID};
    use serde_json::json;

    fn decode(raw: &str) -> DecodedToken {
        DecodedToken::decode(raw).expect("decodes")
    }

    #[test]
    fn valid_token_has_no_errors() {
        let token = decode(&sign(standard_header(), standard_claims()));
        assert!(JwtClaimsVerifier::new()
            .verify(&public_key(), &token)
            .is_empty());
    }

    #[test]
    fn tampered_payload_fails_signature() {
        let raw = sign(standard_header(), standard_claims());
        let other = sign(
            standard_header(),
            json!({"iss": "https://issuer.example/", "sub": "admin", "exp": now() + 600}),
        );
        let mut parts: Vec<&str> = raw.split('.').collect();
        let swapped: Vec<&str> = other.split('.').collect();
        parts[1] = swapped[1];
        let token = decode(&parts.join("."));

        assert_eq!(
            JwtClaimsVerifier::new().verify(&public_key(), &token),
            vec![ClaimError::BadSignature]
        );
    }

    #[test]
    fn all_failures_are_collected() {
        let at = now();
        let token = decode(&sign(
            standard_header(),
            json!({
                "iss": "https://issuer.example/",
                "exp": at - 120,
                "nbf": at + 3600,
                "iat": at + 3600,
                "aud": ["other"],
            }),
        ));
        let errors = JwtClaimsVerifier::new()
            .with_audience("my-api")
            .verify_at(&public_key(), &token, at);

        assert_eq!(
            errors,
            vec![
                ClaimError::Expired(at - 120),
                ClaimError::NotYetValid(at + 3600),
                ClaimError::IssuedInFuture(at + 3600),
                ClaimError::AudienceMismatch("my-api".into()),
            ]
        );
    }

    #[test]
    fn leeway_tolerates_small_skew() {
        let at = now();
        let token = decode(&sign(
            standard_header(),
            json!({"iss": "https://issuer.example/", "exp": at - 20, "nbf": at + 20}),
        ));
        let verifier = JwtClaimsVerifier::new().with_leeway(30);
        assert!(verifier.verify_at(&public_key(), &token, at).is_empty());
    }

    #[test]
    fn missing_exp_is_configurable() {
        let token = decode(&sign(
            standard_header(),
            json!({"iss": "https://issuer.example/"}),
        ));
        assert_eq!(
            JwtClaimsVerifier::new().verify(&public_key(), &token),
            vec![ClaimError::MissingExpiry]
        );
        assert!(JwtClaimsVerifier::new()
            .require_exp(false)
            .verify(&public_key(), &token)
            .is_empty());
    }

    #[test]
    fn symmetric_and_none_algorithms_are_refused() {
        for alg in ["HS256", "none", "XX999"] {
            let raw = sign(standard_header(), standard_claims());
            let mut header = standard_header();
            header["alg"] = json!(alg);
            let forged = {
                use base64::engine::general_purpose::URL_SAFE_NO_PAD;
                use base64::Engine;
                let (_, rest) = raw.split_once('.').expect("segments");
                format!(
                    "{}.{rest}",
                    URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("json"))
                )
            };
            let errors = JwtClaimsVerifier::new().verify(&public_key(), &decode(&forged));
            assert_eq!(errors, vec![ClaimError::UnsupportedAlgorithm(alg.into())]);
        }
    }

    #[test]
    fn key_family_must_match_algorithm() {
        let mut header = standard_header();
        header["alg"] = json!("ES256");
        let token = decode(&sign(header, standard_claims()));
        assert_eq!(
            JwtClaimsVerifier::new().verify(&public_key(), &token),
            vec![ClaimError::AlgorithmMismatch {
                alg: "ES256".into(),
                kid: KID.into(),
            }]
        );

        let pinned = public_key().with_algorithm(Algorithm::RS512);
        let token = decode(&sign(standard_header(), standard_claims()));
        assert!(matches!(
            JwtClaimsVerifier::new().verify(&pinned, &token).as_slice(),
            [ClaimError::AlgorithmMismatch { .. }]
        ));
    }
}
