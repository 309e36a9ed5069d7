use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ResolveError;

pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(300);
/// A cache miss on a fresh key set refetches at most this often.
pub const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    Ec,
}

/// A verification key published by an issuer.
#[derive(Clone)]
pub struct PublicKey {
    kid: String,
    key_type: KeyType,
    algorithm: Option<Algorithm>,
    key: DecodingKey,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("kid", &self.kid)
            .field("key_type", &self.key_type)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl PublicKey {
    pub fn from_rsa_components(kid: impl Into<String>, n: &str, e: &str) -> Result<Self, ResolveError> {
        let kid = kid.into();
        let key = DecodingKey::from_rsa_components(n, e).map_err(|err| ResolveError::KeyParse {
            kid: kid.clone(),
            message: err.to_string(),
        })?;
        Ok(Self::new(kid, KeyType::Rsa, key))
    }

    pub fn from_ec_components(kid: impl Into<String>, x: &str, y: &str) -> Result<Self, ResolveError> {
        let kid = kid.into();
        let key = DecodingKey::from_ec_components(x, y).map_err(|err| ResolveError::KeyParse {
            kid: kid.clone(),
            message: err.to_string(),
        })?;
        Ok(Self::new(kid, KeyType::Ec, key))
    }

    pub fn from_rsa_pem(kid: impl Into<String>, pem: &[u8]) -> Result<Self, ResolveError> {
        let kid = kid.into();
        let key = DecodingKey::from_rsa_pem(pem).map_err(|err| ResolveError::KeyParse {
            kid: kid.clone(),
            message: err.to_string(),
        })?;
        Ok(Self::new(kid, KeyType::Rsa, key))
    }

    fn new(kid: String, key_type: KeyType, key: DecodingKey) -> Self {
        Self {
            kid,
            key_type,
            algorithm: None,
            key,
        }
    }

    /// Pins the key to the algorithm its JWK advertised.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

/// Looks up the public key an issuer signed a token with.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, kid: &str, issuer: &str) -> Result<PublicKey, ResolveError>;
}

/// Thread-safe in-memory key set keyed by `(issuer, kid)`.
#[derive(Clone, Default)]
pub struct StaticKeyResolver {
    inner: Arc<RwLock<HashMap<(String, String), PublicKey>>>,
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_key(&self, issuer: impl Into<String>, key: PublicKey) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert((issuer.into(), key.kid().to_owned()), key);
    }

    pub fn with_key(self, issuer: impl Into<String>, key: PublicKey) -> Self {
        self.insert_key(issuer, key);
        self
    }

    pub fn contains(&self, issuer: &str, kid: &str) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.contains_key(&(issuer.to_owned(), kid.to_owned()))
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, kid: &str, issuer: &str) -> Result<PublicKey, ResolveError> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(&(issuer.to_owned(), kid.to_owned()))
            .cloned()
            .ok_or_else(|| ResolveError::UnknownKeyId {
                kid: kid.to_owned(),
                issuer: issuer.to_owned(),
            })
    }
}

struct CachedKeySet {
    fetched_at: Instant,
    keys: HashMap<String, Result<PublicKey, ResolveError>>,
}

/// Resolves keys through OIDC discovery (`/.well-known/openid-configuration`)
/// and the issuer's JWKS, caching parsed key sets per issuer.
///
/// At most one fetch per issuer is in flight; concurrent misses wait for it
/// and reuse its result.
#[derive(Clone)]
pub struct OidcKeyResolver {
    client: Client,
    cache_ttl: Duration,
    cache: Arc<RwLock<HashMap<String, Arc<CachedKeySet>>>>,
    fetch_locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Default for OidcKeyResolver {
    fn default() -> Self {
        Self::with_client(Client::new())
    }
}

impl OidcKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            cache: Arc::new(RwLock::new(HashMap::new())),
            fetch_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Builds a resolver whose HTTP requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ResolveError::Http {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self::with_client(client))
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn cached(&self, issuer: &str) -> Option<Arc<CachedKeySet>> {
        let guard = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(issuer)
            .filter(|set| set.fetched_at.elapsed() < self.cache_ttl)
            .cloned()
    }

    fn fetch_lock(&self, issuer: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self
            .fetch_locks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(issuer)
        {
            return lock.clone();
        }
        let mut guard = self.fetch_locks.write().unwrap_or_else(PoisonError::into_inner);
        guard.entry(issuer.to_owned()).or_default().clone()
    }

    /// Key set that can answer for `kid` without another fetch: the kid is
    /// present, or the set was fetched too recently to refetch.
    fn usable(&self, issuer: &str, kid: &str) -> Option<Arc<CachedKeySet>> {
        self.cached(issuer).filter(|set| {
            set.keys.contains_key(kid) || set.fetched_at.elapsed() < MIN_REFETCH_INTERVAL
        })
    }

    async fn refresh(&self, issuer: &str) -> Result<Arc<CachedKeySet>, ResolveError> {
        let discovery_url = discovery_url(issuer);
        let discovery: DiscoveryDocument = self.fetch_json(&discovery_url).await?;
        let jwks_uri = discovery
            .jwks_uri
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| ResolveError::MissingJwksUri(discovery_url.clone()))?;

        let document: JwksDocument = self.fetch_json(&jwks_uri).await?;
        let keys = document
            .keys
            .into_iter()
            .filter_map(|entry| {
                let kid = entry.kid.clone().filter(|kid| !kid.is_empty())?;
                Some((kid.clone(), entry.into_public_key(kid)))
            })
            .collect::<HashMap<_, _>>();
        debug!(issuer, jwks_uri = %jwks_uri, count = keys.len(), "fetched issuer key set");

        let entry = Arc::new(CachedKeySet {
            fetched_at: Instant::now(),
            keys,
        });
        let mut guard = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(issuer.to_owned(), entry.clone());
        Ok(entry)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ResolveError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| ResolveError::Http {
                url: url.to_owned(),
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ResolveError::Status {
                url: url.to_owned(),
                status: response.status().as_u16(),
            });
        }

        response.json::<T>().await.map_err(|err| ResolveError::Decode {
            url: url.to_owned(),
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl KeyResolver for OidcKeyResolver {
    async fn resolve(&self, kid: &str, issuer: &str) -> Result<PublicKey, ResolveError> {
        let set = match self.usable(issuer, kid) {
            Some(set) => {
                debug!(issuer, kid, "issuer key cache hit");
                set
            }
            None => {
                let lock = self.fetch_lock(issuer);
                let _fetching = lock.lock().await;
                // Another task may have refreshed while this one waited.
                match self.usable(issuer, kid) {
                    Some(set) => set,
                    None => {
                        debug!(issuer, kid, "issuer key cache miss");
                        self.refresh(issuer).await.inspect_err(|err| {
                            warn!(issuer, kid, error = %err, "failed to fetch issuer keys");
                        })?
                    }
                }
            }
        };

        match set.keys.get(kid) {
            Some(result) => result.clone(),
            None => Err(ResolveError::UnknownKeyId {
                kid: kid.to_owned(),
                issuer: issuer.to_owned(),
            }),
        }
    }
}

fn discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    alg: Option<String>,
    crv: Option<String>,
    n: Option<String>,
    e: Option<String>,
    x: Option<String>,
    y: Option<String>,
}

impl JwkEntry {
    fn into_public_key(self, kid: String) -> Result<PublicKey, ResolveError> {
        let kty = self.kty.unwrap_or_default();
        if let Some(key_use) = self.key_use.as_deref().filter(|key_use| *key_use != "sig") {
            return Err(ResolveError::UnsupportedKey {
                kid,
                kty: format!("{kty} (use '{key_use}')"),
            });
        }
        let key = match (kty.as_str(), self.crv.as_deref()) {
            ("RSA", _) => {
                let (Some(n), Some(e)) = (self.n.as_deref(), self.e.as_deref()) else {
                    return Err(ResolveError::KeyParse {
                        kid,
                        message: "RSA key missing 'n' or 'e'".to_string(),
                    });
                };
                PublicKey::from_rsa_components(kid.clone(), n, e)?
            }
            ("EC", Some("P-256" | "P-384")) => {
                let (Some(x), Some(y)) = (self.x.as_deref(), self.y.as_deref()) else {
                    return Err(ResolveError::KeyParse {
                        kid,
                        message: "EC key missing 'x' or 'y'".to_string(),
                    });
                };
                PublicKey::from_ec_components(kid.clone(), x, y)?
            }
            ("EC", curve) => {
                return Err(ResolveError::UnsupportedKey {
                    kid,
                    kty: format!("EC/{}", curve.unwrap_or("?")),
                });
            }
            _ => return Err(ResolveError::UnsupportedKey { kid, kty }),
        };

        match self.alg.as_deref() {
            Some(alg) => {
                let algorithm = Algorithm::from_str(alg).map_err(|_| ResolveError::KeyParse {
                    kid,
                    message: format!("unknown alg '{alg}'"),
                })?;
                Ok(key.with_algorithm(algorithm))
            }
            None => Ok(key),
        }
    }
}
