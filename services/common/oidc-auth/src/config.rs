use std::env;
use std::time::Duration;

use crate::error::{ConfigError, TrustStoreError};
use crate::pipeline::DEFAULT_RESOLVE_TIMEOUT;
use crate::resolver::DEFAULT_JWKS_CACHE_TTL;
use crate::trust::{parse_issuer_list, IssuerTrustStore};

pub const OIDC_ISSUERS_ENV: &str = "OIDC_ISSUERS";
pub const OIDC_ISSUERS_INTERNAL_ENV: &str = "OIDC_ISSUERS_INTERNAL";
pub const OIDC_RESOLVE_TIMEOUT_ENV: &str = "OIDC_RESOLVE_TIMEOUT_SECONDS";
pub const OIDC_JWKS_CACHE_ENV: &str = "OIDC_JWKS_CACHE_SECONDS";
pub const JWT_LEEWAY_ENV: &str = "JWT_LEEWAY_SECONDS";
pub const JWT_AUDIENCE_ENV: &str = "JWT_AUDIENCE";

/// Trusted issuer lists, as read at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuerConfig {
    pub public: Vec<String>,
    pub internal: Vec<String>,
}

impl IssuerConfig {
    /// Reads `OIDC_ISSUERS` and `OIDC_ISSUERS_INTERNAL`.
    ///
    /// ```text
    /// OIDC_ISSUERS='https://example.com/ https://accounts.google.com'
    /// OIDC_ISSUERS_INTERNAL='http://localhost:3000/, http://my-service-name:8080/'
    /// ```
    pub fn from_env() -> Self {
        Self::from_env_names(OIDC_ISSUERS_ENV, OIDC_ISSUERS_INTERNAL_ENV)
    }

    /// Reads the lists from custom variable names; an empty name falls back to the default.
    pub fn from_env_names(public_var: &str, internal_var: &str) -> Self {
        Self::from_lookup_names(public_var, internal_var, |name| env::var(name).ok())
    }

    pub fn from_lists(public: &str, internal: &str) -> Self {
        Self {
            public: parse_issuer_list(public),
            internal: parse_issuer_list(internal),
        }
    }

    fn from_lookup_names<F>(public_var: &str, internal_var: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let public_var = if public_var.is_empty() {
            OIDC_ISSUERS_ENV
        } else {
            public_var
        };
        let internal_var = if internal_var.is_empty() {
            OIDC_ISSUERS_INTERNAL_ENV
        } else {
            internal_var
        };
        Self::from_lists(
            &lookup(public_var).unwrap_or_default(),
            &lookup(internal_var).unwrap_or_default(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.public.is_empty() && self.internal.is_empty()
    }

    pub fn trust_store(&self) -> Result<IssuerTrustStore, TrustStoreError> {
        IssuerTrustStore::new(self.public.iter().cloned(), self.internal.iter().cloned())
    }
}

/// Startup configuration for bearer-token verification.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuers: IssuerConfig,
    /// Upper bound on a single key lookup.
    pub resolve_timeout: Duration,
    pub jwks_cache_ttl: Duration,
    /// Allowable clock skew in seconds when validating exp/nbf/iat.
    pub leeway_seconds: u64,
    /// Required `aud` entry, if any.
    pub audience: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuers: IssuerConfig::default(),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            jwks_cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            leeway_seconds: 0,
            audience: None,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let issuers =
            IssuerConfig::from_lookup_names(OIDC_ISSUERS_ENV, OIDC_ISSUERS_INTERNAL_ENV, &lookup);

        let resolve_timeout = seconds(&lookup, OIDC_RESOLVE_TIMEOUT_ENV)?
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(DEFAULT_RESOLVE_TIMEOUT);
        let jwks_cache_ttl = seconds(&lookup, OIDC_JWKS_CACHE_ENV)?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_JWKS_CACHE_TTL);
        let leeway_seconds = seconds(&lookup, JWT_LEEWAY_ENV)?.unwrap_or(0);
        let audience = lookup(JWT_AUDIENCE_ENV).and_then(|value| normalize_optional(&value));

        Ok(Self {
            issuers,
            resolve_timeout,
            jwks_cache_ttl,
            leeway_seconds,
            audience,
        })
    }

    pub fn with_issuers(mut self, issuers: IssuerConfig) -> Self {
        self.issuers = issuers;
        self
    }
}

fn seconds<F>(lookup: &F, name: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name).and_then(|value| normalize_optional(&value)) else {
        return Ok(None);
    };
    raw.parse::<u64>()
        .map(Some)
        .map_err(|err| ConfigError::Invalid {
            name: name.to_owned(),
            value: raw.clone(),
            message: err.to_string(),
        })
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
