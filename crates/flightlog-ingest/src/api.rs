//! Lufthansa Open API client
//!
//! Fetches departures for one airport and packs every response page into a
//! raw batch (`{"data": [page, page, ...]}`) ready for [`save_raw_batch`].
//!
//! [`save_raw_batch`]: crate::files::save_raw_batch

use chrono::NaiveDateTime;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::batch::{DATA_KEY, RECORD_KEY};
use crate::config::ApiConfig;
use crate::error::{IngestError, Result};
use crate::flights::flights_in;

/// Seconds shaved off a token lifetime so it is renewed before it expires.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

/// Lifetime assumed when the token response has no `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Client for the departures endpoint
pub struct LufthansaClient {
    client: Client,
    config: ApiConfig,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl LufthansaClient {
    /// Create a client. Fails when the API credentials are not configured.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client_id = config
            .client_id
            .clone()
            .ok_or_else(|| IngestError::config("LH_CLIENT_ID is not set"))?;
        let client_secret = config
            .client_secret
            .clone()
            .ok_or_else(|| IngestError::config("LH_CLIENT_SECRET is not set"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Return a cached bearer token, requesting a new one when it is missing
    /// or about to expire.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        info!("Requesting new API access token");
        let response: TokenResponse = self
            .client
            .post(self.url("/oauth/token"))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let lifetime = response
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
            .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);
        let token = AccessToken {
            value: response.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        };
        let value = token.value.clone();
        *cached = Some(token);

        Ok(value)
    }

    /// Fetch departures from `airport` starting at `from` (airport local time).
    ///
    /// Pages are requested until the API answers 404, a page holds fewer
    /// than `page_limit` flights, or `max_pages` pages were read.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_departing_flights(&self, airport: &str, from: NaiveDateTime) -> Result<Value> {
        let airport = airport.to_uppercase();
        let path = format!(
            "/operations/flightstatus/departures/{}/{}",
            airport,
            from.format("%Y-%m-%dT%H:%M")
        );
        let limit = self.config.page_limit;

        let mut pages: Vec<Value> = Vec::new();
        let mut flights = 0;

        for page in 0..self.config.max_pages {
            let offset = page * limit;
            let token = self.access_token().await?;

            let response = self
                .client
                .get(self.url(&path))
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&[("limit", limit), ("offset", offset)])
                .send()
                .await?;

            if response.status() == StatusCode::NOT_FOUND {
                debug!(offset, "No more departures");
                break;
            }
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(IngestError::api(format!(
                    "departures request for {} returned {}: {}",
                    airport, status, body
                )));
            }

            let body: Value = response.json().await?;
            let count = body
                .get(RECORD_KEY)
                .and_then(Value::as_object)
                .map(|resource| flights_in(resource).len())
                .ok_or_else(|| {
                    IngestError::api(format!("departures page has no '{}' object", RECORD_KEY))
                })?;

            flights += count;
            pages.push(body);

            if count < limit as usize {
                break;
            }
        }

        info!(airport = %airport, pages = pages.len(), flights, "Departures fetched");

        let mut batch = serde_json::Map::new();
        batch.insert(DATA_KEY.to_string(), Value::Array(pages));
        Ok(Value::Object(batch))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::batch::decompose;
    use crate::config::FlightlogConfig;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEPARTURES: &str = "/operations/flightstatus/departures/FRA/2024-03-05T08:00";

    fn config(server: &MockServer, page_limit: u32) -> ApiConfig {
        let mut api = FlightlogConfig::default().api;
        api.client_id = Some("id".to_string());
        api.client_secret = Some("secret".to_string());
        api.base_url = server.uri();
        api.page_limit = page_limit;
        api.max_pages = 5;
        api
    }

    fn from() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn page(numbers: &[&str]) -> Value {
        let flights: Vec<Value> = numbers
            .iter()
            .map(|n| json!({"MarketingCarrier": {"AirlineID": "LH", "FlightNumber": n}}))
            .collect();
        json!({"FlightStatusResource": {"Flights": {"Flight": flights}}})
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "token_type": "bearer",
                "expires_in": 3600
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    async fn mount_page(server: &MockServer, offset: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(DEPARTURES))
            .and(query_param("offset", offset))
            .and(header("authorization", "Bearer tok"))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[test]
    fn test_missing_credentials() {
        let api = FlightlogConfig::default().api;
        assert!(matches!(LufthansaClient::new(api), Err(IngestError::Config(_))));
    }

    #[tokio::test]
    async fn test_pages_until_not_found() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        mount_page(&server, "0", ResponseTemplate::new(200).set_body_json(page(&["1", "2"]))).await;
        mount_page(&server, "2", ResponseTemplate::new(200).set_body_json(page(&["3", "4"]))).await;
        mount_page(&server, "4", ResponseTemplate::new(404)).await;

        let client = LufthansaClient::new(config(&server, 2)).unwrap();
        let batch = client.fetch_departing_flights("fra", from()).await.unwrap();

        assert_eq!(batch["data"].as_array().unwrap().len(), 2);
        assert_eq!(decompose(&batch).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_short_page_stops_paging() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        mount_page(&server, "0", ResponseTemplate::new(200).set_body_json(page(&["1"]))).await;

        let client = LufthansaClient::new(config(&server, 2)).unwrap();
        let batch = client.fetch_departing_flights("FRA", from()).await.unwrap();

        assert_eq!(batch["data"].as_array().unwrap().len(), 1);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.iter().filter(|r| r.method.as_str() == "GET").count(), 1);
    }

    #[tokio::test]
    async fn test_single_flight_object_counts_as_one() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        let single = json!({"FlightStatusResource": {"Flights": {"Flight": {"FlightNumber": "400"}}}});
        mount_page(&server, "0", ResponseTemplate::new(200).set_body_json(single)).await;

        let client = LufthansaClient::new(config(&server, 2)).unwrap();
        let batch = client.fetch_departing_flights("FRA", from()).await.unwrap();

        assert_eq!(batch["data"].as_array().unwrap().len(), 1);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.iter().filter(|r| r.method.as_str() == "GET").count(), 1);
    }

    #[tokio::test]
    async fn test_no_departures_gives_empty_batch() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        mount_page(&server, "0", ResponseTemplate::new(404)).await;

        let client = LufthansaClient::new(config(&server, 2)).unwrap();
        let batch = client.fetch_departing_flights("FRA", from()).await.unwrap();

        assert!(decompose(&batch).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        mount_page(&server, "0", ResponseTemplate::new(500).set_body_string("boom")).await;

        let client = LufthansaClient::new(config(&server, 2)).unwrap();
        let err = client.fetch_departing_flights("FRA", from()).await.unwrap_err();

        assert!(matches!(err, IngestError::Api(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        let client = LufthansaClient::new(config(&server, 2)).unwrap();
        assert_eq!(client.access_token().await.unwrap(), "tok");
        assert_eq!(client.access_token().await.unwrap(), "tok");
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = LufthansaClient::new(config(&server, 2)).unwrap();
        assert!(matches!(client.access_token().await, Err(IngestError::Http(_))));
    }
}
