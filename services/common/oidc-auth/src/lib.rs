pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod resolver;
pub mod token;
pub mod trust;
pub mod verdict;

#[cfg(test)]
mod test_support;

pub use claims::{ClaimError, ClaimsVerifier, JwtClaimsVerifier};
pub use config::{AuthConfig, IssuerConfig};
pub use error::{AuthError, AuthResult, ConfigError, ErrorClass, ResolveError, TrustStoreError};
pub use extractors::{Authenticated, MaybeVerdict, Unauthorized};
pub use metrics::VerificationMetrics;
pub use middleware::{parse_bearer, verify_bearer, BearerScheme, TokenGate, VerificationParams};
pub use pipeline::{TokenVerifier, VerificationFailure, DEFAULT_RESOLVE_TIMEOUT};
pub use resolver::{KeyResolver, KeyType, OidcKeyResolver, PublicKey, StaticKeyResolver};
pub use token::{DecodeError, DecodedToken, FieldError, JsonObject};
pub use trust::{parse_issuer_list, IssuerTrust, IssuerTrustStore, RequestContext};
pub use verdict::{VerificationIssue, VerificationVerdict};
