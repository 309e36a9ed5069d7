use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::ErrorClass;

pub const OUTCOME_AUTHENTICATED: &str = "authenticated";
pub const OUTCOME_ANONYMOUS: &str = "anonymous";
pub const OUTCOME_REJECTED: &str = "rejected";

#[derive(Clone)]
pub struct VerificationMetrics {
    registry: Registry,
    requests: IntCounterVec,
    rejections: IntCounterVec,
}

impl VerificationMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Registers the counters on an existing registry, e.g. one shared with service metrics.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let requests = IntCounterVec::new(
            Opts::new(
                "oidc_auth_requests_total",
                "Count of bearer-token checks grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        let rejections = IntCounterVec::new(
            Opts::new(
                "oidc_auth_rejections_total",
                "Count of rejected bearer tokens grouped by failure class",
            ),
            &["class"],
        )?;
        registry.register(Box::new(rejections.clone()))?;

        Ok(Self {
            registry,
            requests,
            rejections,
        })
    }

    pub fn authenticated(&self) {
        self.requests.with_label_values(&[OUTCOME_AUTHENTICATED]).inc();
    }

    pub fn anonymous(&self) {
        self.requests.with_label_values(&[OUTCOME_ANONYMOUS]).inc();
    }

    pub fn rejected(&self, class: ErrorClass) {
        self.requests.with_label_values(&[OUTCOME_REJECTED]).inc();
        self.rejections.with_label_values(&[class.as_str()]).inc();
    }

    pub fn request_count(&self, outcome: &str) -> u64 {
        self.requests.with_label_values(&[outcome]).get()
    }

    pub fn rejection_count(&self, class: ErrorClass) -> u64 {
        self.rejections.with_label_values(&[class.as_str()]).get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }

    pub fn render(&self) -> Result<Response, prometheus::Error> {
        let buffer = self.encode()?;
        Ok((
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )],
            buffer,
        )
            .into_response())
    }
}
