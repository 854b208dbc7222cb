//! FRED API integration.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::{ConfigError, FredConfig};
use crate::data::source::{FetchError, SeriesSource};
use crate::domain::{Observation, SeriesInfo};

/// FRED caps a single observations page at this many rows.
const OBS_LIMIT: usize = 100_000;

/// Real-time bounds that return every vintage of every observation.
const REALTIME_START: &str = "1776-07-04";
const REALTIME_END: &str = "9999-12-31";

pub struct FredClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FredClient {
    /// Build a client from config, reading the API key from the environment (`.env` honoured).
    pub fn from_config(config: &FredConfig) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| ConfigError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(
            api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        series_id: &str,
        extra: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("series_id", series_id),
                ("api_key", self.api_key.as_str()),
                ("file_type", "json"),
            ])
            .query(extra)
            .send()
            .map_err(|e| FetchError::Network(format!("FRED request failed: {}", e.without_url())))?;

        let resp = check_status(resp, series_id)?;
        resp.json::<T>()
            .map_err(|e| FetchError::InvalidResponse(format!("failed to parse FRED response: {e}")))
    }
}

impl SeriesSource for FredClient {
    fn name(&self) -> &str {
        "FRED"
    }

    fn series_info(&self, series_id: &str) -> Result<SeriesInfo, FetchError> {
        let body: SeriesResponse = self.get_json("series", series_id, &[])?;
        let raw = body
            .seriess
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::NotFound {
                series_id: series_id.to_string(),
            })?;

        let observation_end = match raw.observation_end.as_deref() {
            Some(s) => Some(parse_date(s)?),
            None => None,
        };

        Ok(SeriesInfo {
            id: raw.id,
            title: raw.title,
            frequency_short: raw.frequency_short,
            last_updated: raw.last_updated,
            observation_end,
        })
    }

    /// Every vintage is requested so each period carries the date its current
    /// value was published; only the latest vintage per date is kept.
    fn observations(
        &self,
        series_id: &str,
        start: Option<NaiveDate>,
    ) -> Result<Vec<Observation>, FetchError> {
        let mut latest: BTreeMap<NaiveDate, Observation> = BTreeMap::new();
        let mut offset = 0usize;

        loop {
            let mut query = vec![
                ("sort_order", "asc".to_string()),
                ("limit", OBS_LIMIT.to_string()),
                ("offset", offset.to_string()),
                ("realtime_start", REALTIME_START.to_string()),
                ("realtime_end", REALTIME_END.to_string()),
            ];
            if let Some(date) = start {
                query.push(("observation_start", date.to_string()));
            }

            let body: ObservationsResponse = self.get_json("series/observations", series_id, &query)?;
            let page_len = body.observations.len();

            for raw in body.observations {
                let obs = raw.parse()?;
                keep_latest_vintage(&mut latest, obs);
            }

            offset += page_len;
            let total = body.count.unwrap_or(offset);
            if page_len == 0 || offset >= total {
                break;
            }
        }

        Ok(latest.into_values().collect())
    }
}

fn keep_latest_vintage(latest: &mut BTreeMap<NaiveDate, Observation>, obs: Observation) {
    match latest.get(&obs.date) {
        Some(kept) if kept.released > obs.released => {}
        _ => {
            latest.insert(obs.date, obs);
        }
    }
}

fn check_status(resp: Response, series_id: &str) -> Result<Response, FetchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        return Err(FetchError::RateLimited { retry_after_secs });
    }

    let message = resp
        .text()
        .ok()
        .and_then(|body| serde_json::from_str::<ErrorResponse>(&body).ok())
        .map(|e| e.error_message)
        .unwrap_or_else(|| status.to_string());

    Err(classify_status(status, message, series_id))
}

/// FRED reports an unknown series id as HTTP 400 with a "does not exist" message.
fn classify_status(status: StatusCode, message: String, series_id: &str) -> FetchError {
    if status == StatusCode::NOT_FOUND || message.to_lowercase().contains("does not exist") {
        return FetchError::NotFound {
            series_id: series_id.to_string(),
        };
    }
    if status.is_server_error() {
        return FetchError::Upstream {
            status: status.as_u16(),
            message,
        };
    }
    FetchError::BadRequest(format!("status {}: {message}", status.as_u16()))
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    #[serde(default)]
    seriess: Vec<RawSeries>,
}

#[derive(Debug, Deserialize)]
struct RawSeries {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    frequency_short: String,
    #[serde(default)]
    last_updated: String,
    observation_end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    count: Option<usize>,
    observations: Vec<RawObservation>,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    #[serde(default)]
    realtime_start: Option<String>,
    date: String,
    value: String,
}

impl RawObservation {
    fn parse(&self) -> Result<Observation, FetchError> {
        let mut obs = Observation::new(parse_date(&self.date)?, parse_value(&self.value));
        if let Some(raw) = self.realtime_start.as_deref() {
            obs = obs.released_on(parse_date(raw)?);
        }
        Ok(obs)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error_message: String,
}

fn parse_date(raw: &str) -> Result<NaiveDate, FetchError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| FetchError::InvalidResponse(format!("invalid FRED date '{raw}': {e}")))
}

/// FRED encodes a missing release as `"."`.
fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed == "." || trimmed.is_empty() {
        return None;
    }
    let v = trimmed.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_handles_missing_marker() {
        assert_eq!(parse_value("."), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value(" 4.25 "), Some(4.25));
        assert_eq!(parse_value("NaN"), None);
    }

    #[test]
    fn unknown_series_maps_to_not_found() {
        let err = classify_status(
            StatusCode::BAD_REQUEST,
            "Bad Request.  The series does not exist.".to_string(),
            "NOPE",
        );
        assert_eq!(
            err,
            FetchError::NotFound {
                series_id: "NOPE".into()
            }
        );
    }

    #[test]
    fn server_errors_are_transient() {
        let err = classify_status(StatusCode::BAD_GATEWAY, "gateway".into(), "GDPC1");
        assert!(err.is_transient());
        let err = classify_status(StatusCode::BAD_REQUEST, "api_key is not registered".into(), "GDPC1");
        assert!(!err.is_transient());
    }

    #[test]
    fn observations_payload_deserializes() {
        let body = r#"{
            "count": 2,
            "observations": [
                {"realtime_start": "2024-05-01", "date": "2024-01-01", "value": "22768.866"},
                {"realtime_start": "2024-05-01", "date": "2024-04-01", "value": "."}
            ]
        }"#;
        let parsed: ObservationsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.count, Some(2));
        assert_eq!(parsed.observations[1].value, ".");

        let first = parsed.observations[0].parse().unwrap();
        assert_eq!(first.released, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(first.value, Some(22768.866));
    }

    #[test]
    fn latest_vintage_wins_per_date() {
        let body = r#"{
            "count": 3,
            "observations": [
                {"realtime_start": "2024-04-25", "date": "2024-01-01", "value": "22758.752"},
                {"realtime_start": "2024-07-25", "date": "2024-01-01", "value": "22768.866"},
                {"realtime_start": "2024-07-25", "date": "2024-04-01", "value": "22911.199"}
            ]
        }"#;
        let parsed: ObservationsResponse = serde_json::from_str(body).unwrap();
        let mut latest = BTreeMap::new();
        for raw in parsed.observations.iter().rev() {
            keep_latest_vintage(&mut latest, raw.parse().unwrap());
        }

        let kept: Vec<Observation> = latest.into_values().collect();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].value, Some(22768.866));
        assert_eq!(kept[0].released, NaiveDate::from_ymd_opt(2024, 7, 25));
    }

    #[test]
    fn series_payload_deserializes() {
        let body = r#"{"seriess": [{
            "id": "GDPC1",
            "title": "Real Gross Domestic Product",
            "frequency_short": "Q",
            "last_updated": "2024-07-25 07:52:02-05",
            "observation_end": "2024-04-01"
        }]}"#;
        let parsed: SeriesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.seriess[0].frequency_short, "Q");
        assert_eq!(parse_date("2024-04-01").unwrap(), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    }
}
