use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::{
    config::HttpConfig,
    error::{AuthFailure, FetchError},
    model::{Coordinate, NotableQuery, Observation, ObservedAt},
    retry::RetryPolicy,
};

use super::{ApiKey, ObservationSource};

pub const DEFAULT_BASE_URL: &str = "https://api.ebird.org/v2";
pub const API_TOKEN_HEADER: &str = "X-eBirdApiToken";
const NOTABLE_PATH: &str = "/data/obs/geo/recent/notable";
const UNKNOWN_LOCATION: &str = "Unknown location";

/// Client for eBird's "recent notable observations near a point" endpoint.
#[derive(Debug, Clone)]
pub struct EbirdClient {
    api_key: ApiKey,
    base_url: String,
    http: Client,
    retry: RetryPolicy,
}

impl EbirdClient {
    pub fn new(api_key: ApiKey, timeout: Duration) -> Result<Self, FetchError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(
        api_key: ApiKey,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("birdmap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::from_reqwest)?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_config(api_key: ApiKey, config: &HttpConfig) -> Result<Self, FetchError> {
        let client = Self::with_base_url(api_key, &config.base_url, config.timeout())?;
        Ok(client.with_retry(RetryPolicy::default().with_max_attempts(config.max_attempts)))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_once(&self, query: &NotableQuery) -> Result<Vec<Observation>, FetchError> {
        let url = format!("{}{}", self.base_url, NOTABLE_PATH);

        let res = self
            .http
            .get(&url)
            .header(API_TOKEN_HEADER, self.api_key.expose())
            .query(&[
                ("lat", query.center.lat.to_string()),
                ("lng", query.center.lon.to_string()),
                ("dist", query.radius_km.to_string()),
                ("back", query.back_days.to_string()),
                ("maxResults", query.max_results.to_string()),
            ])
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        check_status(res.status())?;

        let body = res.text().await.map_err(FetchError::from_reqwest)?;

        parse_observations(&body)
    }
}

#[async_trait]
impl ObservationSource for EbirdClient {
    async fn fetch_notable(&self, query: &NotableQuery) -> Result<Vec<Observation>, FetchError> {
        self.retry.run(|| self.fetch_once(query)).await
    }
}

/// Map a response status onto the fetch error taxonomy.
fn check_status(status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }

    match status.as_u16() {
        code @ (401 | 403) => Err(FetchError::Auth(AuthFailure::Rejected(code))),
        429 => Err(FetchError::Network(format!("rate limited by eBird (HTTP {status})"))),
        500..=599 => Err(FetchError::Network(format!("eBird returned HTTP {status}"))),
        _ => Err(FetchError::MalformedResponse(format!("unexpected HTTP status {status}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EbObservation {
    species_code: Option<String>,
    com_name: String,
    sci_name: Option<String>,
    loc_id: Option<String>,
    loc_name: Option<String>,
    obs_dt: String,
    how_many: Option<u32>,
    lat: f64,
    lng: f64,
    sub_id: Option<String>,
}

impl TryFrom<EbObservation> for Observation {
    type Error = String;

    fn try_from(raw: EbObservation) -> Result<Self, Self::Error> {
        let common_name = raw.com_name.trim().to_string();
        if common_name.is_empty() {
            return Err("species name is empty".to_string());
        }

        let coordinate = Coordinate::new(raw.lat, raw.lng);
        if !coordinate.is_valid() {
            return Err("coordinate is out of range".to_string());
        }

        let observed_at = ObservedAt::parse(&raw.obs_dt)
            .ok_or_else(|| "obsDt is not YYYY-MM-DD or YYYY-MM-DD HH:MM".to_string())?;

        let location_name = raw
            .loc_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());

        Ok(Observation {
            species_code: raw.species_code,
            common_name,
            scientific_name: raw.sci_name.filter(|s| !s.trim().is_empty()),
            location_id: raw.loc_id,
            location_name,
            coordinate,
            observed_at,
            how_many: raw.how_many,
            checklist_id: raw.sub_id,
        })
    }
}

/// Parse a notable-observations response body. Any record that breaks the
/// observation invariants fails the whole response.
pub fn parse_observations(body: &str) -> Result<Vec<Observation>, FetchError> {
    let raw: Vec<EbObservation> = serde_json::from_str(body).map_err(|e| {
        FetchError::MalformedResponse(format!(
            "expected a list of observations (line {}, column {})",
            e.line(),
            e.column()
        ))
    })?;

    raw.into_iter()
        .enumerate()
        .map(|(i, record)| {
            Observation::try_from(record)
                .map_err(|reason| FetchError::MalformedResponse(format!("record {i}: {reason}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    const SAMPLE: &str = r#"[
        {
            "speciesCode": "snoowl1",
            "comName": "Snowy Owl",
            "sciName": "Bubo scandiacus",
            "locId": "L123",
            "locName": "Logan Airport",
            "obsDt": "2024-01-05 14:30",
            "howMany": 1,
            "lat": 42.36,
            "lng": -71.06,
            "obsValid": true,
            "obsReviewed": false,
            "locationPrivate": false,
            "subId": "S158000000"
        },
        {
            "speciesCode": "kinei",
            "comName": "King Eider",
            "locName": "",
            "obsDt": "2024-01-04",
            "lat": 42.29,
            "lng": -70.92
        }
    ]"#;

    fn query() -> NotableQuery {
        NotableQuery {
            center: Coordinate::new(42.3974042, -71.1366337),
            radius_km: 10,
            back_days: 2,
            max_results: 200,
        }
    }

    /// Serve one canned response per connection and record each request head.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else { return };

                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                recorded.lock().unwrap().push(String::from_utf8_lossy(&buf).to_lowercase());

                let reply = format!(
                    "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{addr}"), seen)
    }

    fn client(base_url: &str) -> EbirdClient {
        EbirdClient::with_base_url(ApiKey::new("test-key").unwrap(), base_url, Duration::from_secs(5))
            .unwrap()
            .with_retry(RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            })
    }

    #[test]
    fn parses_sample_response() {
        let obs = parse_observations(SAMPLE).expect("sample should parse");

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].common_name, "Snowy Owl");
        assert_eq!(obs[0].coordinate, Coordinate::new(42.36, -71.06));
        assert_eq!(obs[0].observed_at.to_string(), "2024-01-05 14:30");
        assert_eq!(obs[0].how_many, Some(1));
        assert_eq!(obs[0].checklist_id.as_deref(), Some("S158000000"));
        assert_eq!(obs[1].location_name, "Unknown location");
        assert_eq!(obs[1].how_many, None);
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(parse_observations("[]").unwrap().is_empty());
    }

    #[test]
    fn non_list_body_is_malformed() {
        for body in ["", "{\"error\": \"nope\"}", "<html>oops</html>", "[{\"comName\": 3}]"] {
            let err = parse_observations(body).unwrap_err();
            assert!(matches!(err, FetchError::MalformedResponse(_)), "body {body:?}");
        }
    }

    #[test]
    fn out_of_range_latitude_is_malformed() {
        let body = r#"[{"comName": "Snowy Owl", "obsDt": "2024-01-05", "lat": 120.0, "lng": 0.0}]"#;
        let err = parse_observations(body).unwrap_err();

        assert!(err.to_string().contains("record 0"));
        assert!(err.to_string().contains("out of range"));
        assert!(!err.to_string().contains("120"));
    }

    #[test]
    fn blank_species_is_malformed() {
        let body = r#"[{"comName": "  ", "obsDt": "2024-01-05", "lat": 1.0, "lng": 1.0}]"#;
        assert!(matches!(parse_observations(body), Err(FetchError::MalformedResponse(_))));
    }

    #[test]
    fn bad_date_is_malformed() {
        let body = r#"[
            {"comName": "Snowy Owl", "obsDt": "2024-01-05", "lat": 1.0, "lng": 1.0},
            {"comName": "Snowy Owl", "obsDt": "<script>last tuesday", "lat": 1.0, "lng": 1.0}
        ]"#;
        let msg = parse_observations(body).unwrap_err().to_string();

        assert!(msg.contains("record 1"));
        assert!(msg.contains("YYYY-MM-DD HH:MM"));
        assert!(!msg.contains("last tuesday"), "response text leaked: {msg}");
    }

    #[test]
    fn status_mapping() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_status(StatusCode::FORBIDDEN),
            Err(FetchError::Auth(AuthFailure::Rejected(403)))
        ));
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(FetchError::Auth(AuthFailure::Rejected(401)))
        ));
        assert!(matches!(check_status(StatusCode::BAD_GATEWAY), Err(FetchError::Network(_))));
        assert!(matches!(
            check_status(StatusCode::TOO_MANY_REQUESTS),
            Err(FetchError::Network(_))
        ));
        assert!(matches!(
            check_status(StatusCode::NOT_FOUND),
            Err(FetchError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn sends_key_header_and_query() {
        let (base, seen) = serve(vec![(200, SAMPLE)]).await;

        let obs = client(&base).fetch_notable(&query()).await.expect("fetch should succeed");
        assert_eq!(obs.len(), 2);

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let head = &requests[0];
        assert!(head.starts_with("get /data/obs/geo/recent/notable?"));
        assert!(head.contains("x-ebirdapitoken: test-key"));
        assert!(head.contains("lat=42.3974042"));
        assert!(head.contains("lng=-71.1366337"));
        assert!(head.contains("dist=10"));
        assert!(head.contains("back=2"));
        assert!(head.contains("maxresults=200"));
    }

    #[tokio::test]
    async fn forbidden_is_auth_error_without_retry() {
        let (base, seen) = serve(vec![(403, "{}"), (200, SAMPLE)]).await;

        let err = client(&base).fetch_notable(&query()).await.unwrap_err();

        assert!(matches!(err, FetchError::Auth(AuthFailure::Rejected(403))));
        assert!(!err.to_string().contains("test-key"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn server_error_is_retried_then_succeeds() {
        let (base, seen) = serve(vec![(503, "down"), (200, SAMPLE)]).await;

        let obs = client(&base).fetch_notable(&query()).await.expect("second attempt succeeds");

        assert_eq!(obs.len(), 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn persistent_server_error_is_network_error() {
        let (base, seen) = serve(vec![(500, "err"), (500, "err"), (200, SAMPLE)]).await;

        let err = client(&base).fetch_notable(&query()).await.unwrap_err();

        assert!(matches!(err, FetchError::Network(_)));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn garbage_body_is_malformed_without_retry() {
        let (base, seen) = serve(vec![(200, "not json at all"), (200, SAMPLE)]).await;

        let err = client(&base).fetch_notable(&query()).await.unwrap_err();

        assert!(matches!(err, FetchError::MalformedResponse(_)));
        assert!(!err.to_string().contains("not json at all"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unresponsive_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = EbirdClient::with_base_url(
            ApiKey::new("test-key").unwrap(),
            &format!("http://{addr}"),
            Duration::from_millis(200),
        )
        .unwrap()
        .with_retry(RetryPolicy::default().with_max_attempts(1));

        let err = client.fetch_notable(&query()).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}")).fetch_notable(&query()).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }
}
