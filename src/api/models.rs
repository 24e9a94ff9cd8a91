//! Response bodies of the service endpoints.
//!
//! Routed requests answer with whatever the third party returned (after
//! filtering) and delivered assets with their raw bytes, so only the health
//! and error bodies are modelled here.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::observability::MetricsSnapshot;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub version: String,
    pub metrics: MetricsSnapshot,
}
