//! HTTP client utilities.
//!
//! Provides the shared client builder and the status/body classification
//! every provider client goes through.

use std::error::Error as StdError;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, RequestBuilder};
use serde::de::DeserializeOwned;

use super::provider::Provider;
use crate::error::{Result, SpendError, TransportKind};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest body excerpt carried in an error message.
const MAX_BODY_EXCERPT: usize = 500;

/// Marker text vendors use for accounts without a team.
const TEAM_NOT_FOUND: &str = "team not found";

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("spendbar/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SpendError::Other(anyhow::anyhow!("failed to build HTTP client: {e}")))
}

/// Which kind of endpoint a request targets.
///
/// Some vendors answer an expired session on their identity endpoint with an
/// empty 204 instead of a 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Auth,
    Data,
}

/// Send a request and decode a JSON body, classifying every failure.
///
/// # Errors
///
/// Returns the classified [`SpendError`] for transport failures, non-2xx
/// statuses, empty bodies and undecodable JSON.
pub async fn send_json<T: DeserializeOwned>(
    provider: Provider,
    kind: EndpointKind,
    request: RequestBuilder,
) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    let status = response.status().as_u16();
    let retry_after = parse_retry_after(response.headers(), Utc::now());
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    tracing::debug!(%provider, status, bytes = body.len(), "HTTP response received");

    check_response(provider, kind, status, retry_after, &body)?;

    serde_json::from_str(&body).map_err(|e| {
        tracing::error!(
            %provider,
            status,
            error = %e,
            "Response did not match the expected shape"
        );
        SpendError::Decoding {
            provider,
            message: e.to_string(),
            status_code: Some(status),
        }
    })
}

/// Classify a status code and body.
///
/// Returns `Ok(())` only for a 2xx response with a non-empty body that does
/// not carry a "team not found" error object.
///
/// # Errors
///
/// - 204 from an auth endpoint: `Unauthorized`
/// - empty 2xx body or 204 elsewhere: `Decoding`
/// - 401: `Unauthorized`
/// - 429: `RateLimited`
/// - 503: `ServiceUnavailable`
/// - other 5xx: `ServerError`
/// - anything else: `Network` with the raw body
/// - "team not found" in an error body: `NoTeamFound`
pub fn check_response(
    provider: Provider,
    kind: EndpointKind,
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> Result<()> {
    match status {
        204 => match kind {
            EndpointKind::Auth => Err(SpendError::Unauthorized { provider }),
            EndpointKind::Data => Err(SpendError::Decoding {
                provider,
                message: "unexpected empty response".to_string(),
                status_code: Some(204),
            }),
        },
        200..=299 => {
            if body.trim().is_empty() {
                return Err(SpendError::Decoding {
                    provider,
                    message: "empty response body".to_string(),
                    status_code: Some(status),
                });
            }
            if structured_error_text(body).is_some_and(|text| mentions_team_not_found(&text)) {
                return Err(SpendError::NoTeamFound { provider });
            }
            Ok(())
        }
        401 => Err(SpendError::Unauthorized { provider }),
        429 => Err(SpendError::RateLimited {
            provider,
            retry_after,
            message: excerpt(body, "too many requests"),
        }),
        503 => Err(SpendError::ServiceUnavailable {
            provider,
            message: excerpt(body, "service unavailable"),
        }),
        _ if mentions_team_not_found(body) => Err(SpendError::NoTeamFound { provider }),
        500..=599 => Err(SpendError::ServerError {
            provider,
            status_code: status,
            message: excerpt(body, "server error"),
        }),
        _ => Err(SpendError::Network {
            provider,
            message: excerpt(body, "request failed"),
            status_code: Some(status),
        }),
    }
}

/// Case-insensitive check for the vendor "team not found" condition.
#[must_use]
pub fn mentions_team_not_found(text: &str) -> bool {
    text.to_lowercase().contains(TEAM_NOT_FOUND)
}

/// Collect the text of an `error` field in a JSON body, if there is one.
fn structured_error_text(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let mut out = String::new();
    collect_strings(error, &mut out);
    Some(out)
}

fn collect_strings(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push_str(s);
            out.push(' ');
        }
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

fn excerpt(body: &str, fallback: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    match trimmed.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Parse a `Retry-After` header given as delta seconds or an HTTP date.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Map a reqwest failure to a transport error kind.
#[must_use]
pub fn transport_error(provider: Provider, err: &reqwest::Error) -> SpendError {
    let chain = error_chain(err);
    let lower = chain.to_lowercase();

    let kind = if err.is_timeout() {
        TransportKind::Timeout
    } else if lower.contains("dns") || lower.contains("failed to lookup") || lower.contains("resolve")
    {
        TransportKind::Dns
    } else if lower.contains("network is unreachable") || lower.contains("no route to host") {
        TransportKind::Offline
    } else if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
        TransportKind::Tls
    } else if err.is_connect() {
        TransportKind::ConnectionRefused
    } else if err.is_body()
        || lower.contains("connection reset")
        || lower.contains("connection closed")
        || lower.contains("broken pipe")
        || lower.contains("incomplete message")
    {
        TransportKind::ConnectionLost
    } else {
        TransportKind::Other
    };

    SpendError::Transport {
        provider,
        kind,
        message: chain,
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
