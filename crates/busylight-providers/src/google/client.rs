//! Google Calendar freeBusy API client.

use std::collections::BTreeMap;

use busylight_core::BusyPeriod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{CalendarBusy, FreeBusyQuery, FreeBusyResponse};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest<'a> {
    time_min: String,
    time_max: String,
    items: Vec<ApiItem<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiItem<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    calendars: BTreeMap<String, ApiCalendar>,
}

#[derive(Debug, Deserialize)]
struct ApiCalendar {
    #[serde(default)]
    busy: Vec<ApiPeriod>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiPeriod {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    domain: Option<String>,
    reason: String,
}

/// Maps a failed `send()` to a provider error.
pub(super) fn send_error(what: &str, e: reqwest::Error) -> ProviderError {
    let err = if e.is_timeout() {
        ProviderError::timeout(format!("{what} request timed out"))
    } else if e.is_connect() {
        ProviderError::network(format!("{what} connection failed"))
    } else {
        ProviderError::network(format!("{what} request failed"))
    };
    err.with_source(e)
}

pub(super) async fn read_body(response: reqwest::Response) -> ProviderResult<String> {
    response
        .text()
        .await
        .map_err(|e| ProviderError::network("failed to read response").with_source(e))
}

/// Low-level client for `POST /freeBusy`.
#[derive(Debug, Clone)]
pub struct FreeBusyClient {
    http_client: reqwest::Client,
    api_base: String,
}

impl FreeBusyClient {
    pub fn new(http_client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http_client,
            api_base: api_base.into(),
        }
    }

    /// Issues one freeBusy query with the given bearer token.
    pub async fn query(
        &self,
        access_token: &str,
        query: &FreeBusyQuery,
    ) -> ProviderResult<FreeBusyResponse> {
        let url = format!("{}/freeBusy", self.api_base.trim_end_matches('/'));
        let body = ApiRequest {
            time_min: query.window.start.to_rfc3339(),
            time_max: query.window.end.to_rfc3339(),
            items: query
                .calendar_ids
                .iter()
                .map(|id| ApiItem { id: id.as_str() })
                .collect(),
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error("freeBusy", e))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(ProviderError::rate_limited(format!(
                "rate limit exceeded{}",
                retry_after
                    .map(|s| format!(", retry after {s} seconds"))
                    .unwrap_or_default()
            )));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::authentication(
                "access token expired or invalid",
            ));
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::authorization("access denied"));
        }

        let text = read_body(response).await?;

        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(ProviderError::bad_request(format!("freeBusy rejected: {text}")));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::not_found(format!("freeBusy endpoint not found: {url}")));
        }
        if !status.is_success() {
            return Err(ProviderError::server(format!("API error ({status}): {text}")));
        }

        parse_response(&text)
    }
}

/// Parses a freeBusy body, dropping periods with bad timestamps.
pub(super) fn parse_response(body: &str) -> ProviderResult<FreeBusyResponse> {
    let api: ApiResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response("failed to parse freeBusy response").with_source(e)
    })?;

    let calendars = api
        .calendars
        .into_iter()
        .map(|(id, calendar)| {
            let busy = calendar
                .busy
                .iter()
                .filter_map(|period| convert_period(&id, period))
                .collect();
            let errors = calendar
                .errors
                .into_iter()
                .map(|e| match e.domain {
                    Some(domain) => format!("{domain}: {}", e.reason),
                    None => e.reason,
                })
                .collect();
            (id, CalendarBusy { busy, errors })
        })
        .collect::<BTreeMap<_, _>>();

    debug!(calendars = calendars.len(), "Parsed freeBusy response");
    Ok(FreeBusyResponse { calendars })
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn convert_period(calendar: &str, period: &ApiPeriod) -> Option<BusyPeriod> {
    let (Some(start), Some(end)) = (parse_time(&period.start), parse_time(&period.end)) else {
        warn!(
            calendar,
            start = %period.start,
            end = %period.end,
            "Dropping busy period with unparseable timestamp"
        );
        return None;
    };

    BusyPeriod::new(start, end)
        .map_err(|e| warn!(calendar, error = %e, "Dropping malformed busy period"))
        .ok()
}
