use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use reqwest::{Client, Url};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::client_ip::{client_ip, obfuscate_ip};
use super::error::ForwardError;
use super::filter::{
    assemble_cookies, filter_query, filter_request_headers, filter_response_headers, parse_cookies,
};
use super::policy::{RouteMethod, RoutePolicy};
use crate::observability::Metrics;
use crate::proxy::{ClientOptions, ProxyRouter, TransportError};

/// The parts of a client request the pipeline may draw from
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Query parameters in arrival order
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub peer: Option<IpAddr>,
}

/// Filtered third-party response, ready to hand back to the client
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for ForwardedResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

/// Forwards client requests to third parties according to a [`RoutePolicy`]
pub struct Forwarder {
    client: Client,
    metrics: Arc<Metrics>,
}

impl Forwarder {
    pub fn new(
        router: &ProxyRouter,
        options: &ClientOptions,
        metrics: Arc<Metrics>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: router.build_client(options)?,
            metrics,
        })
    }

    /// Run the full pipeline for one inbound request.
    ///
    /// Policy violations are rejected before any network call; every other
    /// failure is logged here and surfaces as a gateway timeout.
    pub async fn forward(
        &self,
        inbound: &InboundRequest,
        policy: &RoutePolicy,
    ) -> Result<ForwardedResponse, ForwardError> {
        let result = self.forward_inner(inbound, policy).await;

        match &result {
            Err(ForwardError::PolicyViolation(reason)) => {
                warn!(route = %policy.name, reason, "Rejected request before forwarding");
                self.metrics.policy_violation();
            }
            Err(e) => {
                error!(route = %policy.name, endpoint = %policy.target_endpoint, error = %e, "Forwarding to third party failed");
                self.metrics.gateway_timeout();
            }
            Ok(_) => {}
        }

        result
    }

    async fn forward_inner(
        &self,
        inbound: &InboundRequest,
        policy: &RoutePolicy,
    ) -> Result<ForwardedResponse, ForwardError> {
        check_body(inbound, policy)?;

        let request = self.build_request(inbound, policy)?;
        let sent = request.url().query().map_or(0, str::len) as u64 + inbound.body.len() as u64;
        debug!(route = %policy.name, url = %request.url(), "Routing request to third party");

        let response = self.client.execute(request).await?;
        let status = response.status();
        let headers = filter_response_headers(response.headers(), policy);
        let body = response.bytes().await?;

        self.metrics
            .request_forwarded(&policy.name, sent, body.len() as u64);

        Ok(ForwardedResponse {
            status,
            headers,
            body,
        })
    }

    /// Build the outbound request without sending it.
    ///
    /// The client adds `Accept: */*` when the inbound `Accept` is not
    /// allow-listed; the inbound value is never copied in that case.
    pub fn build_request(
        &self,
        inbound: &InboundRequest,
        policy: &RoutePolicy,
    ) -> Result<reqwest::Request, ForwardError> {
        let query = filter_query(&inbound.query, policy);
        let url = outbound_url(&policy.target_endpoint, &query);

        let mut headers = filter_request_headers(&inbound.headers, policy);

        let cookies = parse_cookies(&inbound.headers);
        if let Some(cookie) = assemble_cookies(&cookies, policy) {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    headers.insert(header::COOKIE, value);
                }
                Err(_) => warn!(route = %policy.name, "Dropping cookie header with invalid characters"),
            }
        }

        if let Some(name) = &policy.client_ip_header {
            if let Some(ip) = client_ip(&inbound.headers, inbound.peer) {
                if let (Ok(name), Ok(value)) = (
                    header::HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(&obfuscate_ip(&ip)),
                ) {
                    headers.insert(name, value);
                }
            }
        }

        let mut builder = self
            .client
            .request(policy.method.as_method(), url)
            .headers(headers);

        if policy.method == RouteMethod::Post {
            builder = builder.body(inbound.body.clone());
        }

        builder
            .build()
            .map_err(|e| ForwardError::InvalidEndpoint(e.to_string()))
    }
}

fn check_body(inbound: &InboundRequest, policy: &RoutePolicy) -> Result<(), ForwardError> {
    match policy.method {
        RouteMethod::Post if inbound.body.is_empty() => Err(ForwardError::PolicyViolation(
            "POST route requires a request body".to_string(),
        )),
        RouteMethod::Get if !inbound.body.is_empty() => Err(ForwardError::PolicyViolation(
            "GET route does not accept a request body".to_string(),
        )),
        _ => Ok(()),
    }
}

fn outbound_url(endpoint: &Url, query: &str) -> Url {
    let mut url = endpoint.clone();
    if query.is_empty() {
        return url;
    }

    let combined = match endpoint.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
        _ => query.to_string(),
    };
    url.set_query(Some(&combined));
    url
}
