use std::collections::BTreeSet;

use axum::http::uri::Authority;
use axum::http::{header::HOST, HeaderMap, Method, Request, Uri};
use reqwest::Url;
use tracing::trace;

use crate::error::TrustStoreError;

/// Request attributes available to an issuer trust decision.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    method: &'a Method,
    uri: &'a Uri,
    headers: &'a HeaderMap,
}

impl<'a> RequestContext<'a> {
    pub fn new(method: &'a Method, uri: &'a Uri, headers: &'a HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        Self::new(request.method(), request.uri(), request.headers())
    }

    pub fn method(&self) -> &Method {
        self.method
    }

    pub fn uri(&self) -> &Uri {
        self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        self.headers
    }

    /// Host the client addressed, from the request target or the `Host` header.
    pub fn host(&self) -> Option<&str> {
        self.uri.host().or_else(|| {
            self.headers
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .and_then(authority_host)
        })
    }
}

/// Host part of a `Host` header value, keeping IPv6 brackets.
fn authority_host(raw: &str) -> Option<&str> {
    let authority = raw.parse::<Authority>().ok()?;
    let host = authority.host();
    raw.find(host).map(|start| &raw[start..start + host.len()])
}

/// Decides whether tokens from an issuer may be accepted for a request.
///
/// The request context lets an implementation bind trust to how the request
/// arrived, e.g. refusing an issuer that does not match the connection host.
pub trait IssuerTrust: Send + Sync {
    fn is_trusted(&self, issuer: &str, ctx: &RequestContext<'_>) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Partition {
    Public,
    Internal,
}

/// Immutable set of trusted issuer URLs.
///
/// Public issuers must be served over https. Internal issuers (sidecars,
/// in-cluster identity providers) may also use plain http.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuerTrustStore {
    public: BTreeSet<String>,
    internal: BTreeSet<String>,
}

impl IssuerTrustStore {
    pub fn new<P, I>(public: P, internal: I) -> Result<Self, TrustStoreError>
    where
        P: IntoIterator,
        P::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Ok(Self {
            public: collect_partition(public, Partition::Public)?,
            internal: collect_partition(internal, Partition::Internal)?,
        })
    }

    /// Builds a store from comma- and/or whitespace-delimited lists.
    pub fn from_lists(public: &str, internal: &str) -> Result<Self, TrustStoreError> {
        Self::new(parse_issuer_list(public), parse_issuer_list(internal))
    }

    pub fn contains(&self, issuer: &str) -> bool {
        self.public.contains(issuer) || self.internal.contains(issuer)
    }

    /// All trusted issuers, deduplicated across both partitions.
    pub fn issuers(&self) -> impl Iterator<Item = &str> {
        self.public.union(&self.internal).map(String::as_str)
    }

    pub fn public_issuers(&self) -> impl Iterator<Item = &str> {
        self.public.iter().map(String::as_str)
    }

    pub fn internal_issuers(&self) -> impl Iterator<Item = &str> {
        self.internal.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.issuers().count()
    }

    pub fn is_empty(&self) -> bool {
        self.public.is_empty() && self.internal.is_empty()
    }
}

impl IssuerTrust for IssuerTrustStore {
    fn is_trusted(&self, issuer: &str, ctx: &RequestContext<'_>) -> bool {
        let trusted = self.contains(issuer);
        trace!(issuer, host = ?ctx.host(), trusted, "issuer trust lookup");
        trusted
    }
}

/// Splits a comma- and/or whitespace-delimited issuer list, dropping empty entries.
pub fn parse_issuer_list(list: &str) -> Vec<String> {
    list.replace(',', " ")
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

fn collect_partition<T>(entries: T, partition: Partition) -> Result<BTreeSet<String>, TrustStoreError>
where
    T: IntoIterator,
    T::Item: Into<String>,
{
    let mut issuers = BTreeSet::new();
    for entry in entries {
        let entry: String = entry.into();
        let issuer = entry.trim();
        if issuer.is_empty() {
            continue;
        }
        validate_issuer(issuer, partition)?;
        issuers.insert(issuer.to_owned());
    }
    Ok(issuers)
}

fn validate_issuer(issuer: &str, partition: Partition) -> Result<(), TrustStoreError> {
    let url = Url::parse(issuer).map_err(|err| TrustStoreError::InvalidUrl {
        issuer: issuer.to_owned(),
        message: err.to_string(),
    })?;

    match (partition, url.scheme()) {
        (_, "https") => Ok(()),
        (Partition::Internal, "http") => Ok(()),
        (Partition::Public, "http") => Err(TrustStoreError::InsecureIssuer(issuer.to_owned())),
        (_, scheme) => Err(TrustStoreError::InvalidUrl {
            issuer: issuer.to_owned(),
            message: format!("unsupported scheme '{scheme}'"),
        }),
    }
}
