//! Request handlers and their wire types.

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use tally_aggregate::{AggregateError, CacheStatus, PopularQuery};
use tally_ledger::{VoteRequest, RECENT_VOTES_KEY};
use tally_types::{PollId, TimestampMs, VoterIdentity};

use crate::server::AppState;

// ── Vote submission ──────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteParams {
    pub poll: String,
    pub vote: String,
    #[serde(default)]
    pub is_open: bool,
    pub country: Option<String>,
    pub captcha_token: Option<String>,
    pub phone_number: Option<String>,
    pub phone_token: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct VoteResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_eligible: Option<String>,
}

pub async fn submit_vote(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<VoteParams>,
) -> Response {
    let identity = source_identity(&headers, addr);
    let request = VoteRequest {
        poll: params.poll,
        option: params.vote,
        open_namespace: params.is_open,
        country_hint: params.country,
        captcha_token: params.captcha_token,
        phone_number: params.phone_number,
        phone_token: params.phone_token,
        user_id: params.user_id,
        identity,
    };

    match state.ledger.submit(&request, TimestampMs::now()) {
        Ok(_) => (
            StatusCode::OK,
            Json(VoteResponse {
                accepted: true,
                reason: None,
                message: "Vote registered".to_string(),
                next_eligible: None,
            }),
        )
            .into_response(),
        Err(e) => {
            let status = match e.reason().as_str() {
                "storage_inconsistency" | "storage_failure" => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            (
                status,
                Json(VoteResponse {
                    accepted: false,
                    reason: Some(e.reason().as_str()),
                    message: e.to_string(),
                    next_eligible: e.next_eligible().map(|t| t.to_iso8601()),
                }),
            )
                .into_response()
        }
    }
}

/// The submitting identity: the first `X-Forwarded-For` hop when present
/// (the deployment sits behind a proxy), otherwise the peer address.
fn source_identity(headers: &HeaderMap, addr: SocketAddr) -> VoterIdentity {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    match forwarded {
        Some(ip) => VoterIdentity::new(ip),
        None => VoterIdentity::new(addr.ip().to_string()),
    }
}

// ── Poll results ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PollParams {
    pub poll: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
}

pub async fn poll_results(
    State(state): State<AppState>,
    Query(params): Query<PollParams>,
) -> Response {
    let Some(poll_name) = params.poll.filter(|p| !p.is_empty()) else {
        return error_json(StatusCode::BAD_REQUEST, "Missing poll parameter");
    };
    let force_refresh = params.refresh.as_deref() == Some("true");
    let poll = PollId::from_stored(poll_name);

    match state
        .aggregator
        .poll_results(&poll, force_refresh, TimestampMs::now())
    {
        Ok(results) => {
            let cache_header = match results.cache {
                CacheStatus::Hit => "HIT",
                CacheStatus::Miss => "MISS",
            };
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv"),
                    (header::HeaderName::from_static("x-cache"), cache_header),
                ],
                results.csv,
            )
                .into_response()
        }
        Err(AggregateError::NoData(poll)) => {
            error_json(StatusCode::NOT_FOUND, &format!("no votes found for poll: {poll}"))
        }
        Err(e) => {
            tracing::error!(error = %e, "poll aggregation failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to aggregate votes")
        }
    }
}

// ── Popular polls ────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub seed: Option<u64>,
    pub q: Option<String>,
    pub tags: Option<String>,
    pub poll_to_update: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
}

pub async fn popular_polls(
    State(state): State<AppState>,
    Query(params): Query<PopularParams>,
) -> Response {
    let defaults = PopularQuery::default();
    let query = PopularQuery {
        limit: params.limit.unwrap_or(defaults.limit),
        offset: params.offset.unwrap_or(defaults.offset),
        seed: params.seed.unwrap_or(defaults.seed),
        query: params.q,
        tags: params.tags,
        poll_to_update: params.poll_to_update,
        force_refresh: params.refresh.as_deref() == Some("true"),
    };

    match state.popular.popular(&query, TimestampMs::now()) {
        Ok(page) => {
            let mut response = Json(&page).into_response();
            let cache_header = match page.cache {
                CacheStatus::Hit => "HIT",
                CacheStatus::Miss => "MISS",
            };
            response
                .headers_mut()
                .insert("x-cache", cache_header.parse().expect("static header"));
            if let Some(age) = page.cache_age_secs {
                if let Ok(value) = age.to_string().parse() {
                    response.headers_mut().insert("x-cache-age", value);
                }
            }
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "popular listing failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to build poll listing")
        }
    }
}

// ── Recent activity ──────────────────────────────────────────────────────

pub async fn recent_votes(State(state): State<AppState>) -> Response {
    match state.store.get_text(RECENT_VOTES_KEY) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) if e.is_not_found() => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"votes":[]}"#.to_string(),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "recent votes read failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read recent votes")
        }
    }
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "message": message })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_identity_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(source_identity(&headers, addr).as_str(), "203.0.113.7");
    }

    #[test]
    fn test_source_identity_falls_back_to_peer() {
        let headers = HeaderMap::new();
        let addr: SocketAddr = "192.0.2.5:1234".parse().unwrap();
        assert_eq!(source_identity(&headers, addr).as_str(), "192.0.2.5");
    }
}
