//! Usage analytics over the Google Analytics Measurement Protocol
//!
//! Events are sent from a spawned task; failures are logged and never reach
//! the response.

use crate::config::AnalyticsConfig;
use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://www.google-analytics.com/mp/collect";
const EVENT_NAME: &str = "cdn_api_request";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Image,
    Content,
    Health,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Image => "image",
            Endpoint::Content => "content",
            Endpoint::Health => "health",
        }
    }
}

/// What is recorded about one API request
#[derive(Debug, Clone, Serialize)]
pub struct RequestData {
    pub ip: Option<String>,
    pub country: Option<String>,
    pub origin: Option<String>,
    pub host_url: Option<String>,
    pub repository_id: Option<String>,
    pub query_parameters: Map<String, Value>,
    pub endpoint: Endpoint,
    pub timestamp: DateTime<Utc>,
}

impl RequestData {
    /// Collect request data from Cloudflare and standard headers
    pub fn collect(
        headers: &HeaderMap,
        repository_id: Option<&str>,
        endpoint: Endpoint,
        query: &[(String, String)],
    ) -> Self {
        let origin = header_str(headers, header::ORIGIN.as_str())
            .or_else(|| header_str(headers, header::REFERER.as_str()));
        let host_url = header_str(headers, header::HOST.as_str()).map(|host| {
            let scheme = match header_str(headers, "x-forwarded-proto").as_deref() {
                Some("https") => "https",
                _ => "http",
            };
            format!("{}://{}", scheme, host)
        });

        Self {
            ip: header_str(headers, "cf-connecting-ip"),
            country: header_str(headers, "cf-ipcountry"),
            origin,
            host_url,
            repository_id: repository_id.map(str::to_string),
            query_parameters: parse_query_parameters(query),
            endpoint,
            timestamp: Utc::now(),
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Coerce query values into JSON numbers and booleans where they look like one
///
/// Repeated keys are joined with commas.
pub fn parse_query_parameters(query: &[(String, String)]) -> Map<String, Value> {
    let mut joined: Vec<(&str, String)> = Vec::new();
    for (key, value) in query {
        match joined.iter_mut().find(|(k, _)| *k == key.as_str()) {
            Some((_, existing)) => {
                existing.push(',');
                existing.push_str(value);
            }
            None => joined.push((key.as_str(), value.clone())),
        }
    }

    joined
        .into_iter()
        .map(|(key, value)| (key.to_string(), coerce_value(value)))
        .collect()
}

fn coerce_value(raw: String) -> Value {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        if let Some(number) = trimmed.parse::<f64>().ok().filter(|n| n.is_finite()) {
            if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
                return Value::Number(Number::from(number as i64));
            }
            if let Some(number) = Number::from_f64(number) {
                return Value::Number(number);
            }
        }
    }

    match raw.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw),
    }
}

/// Pseudonymous client id: a 32-bit string hash of the IP plus a millisecond timestamp
pub fn client_id(data: &RequestData) -> String {
    let now_ms = Utc::now().timestamp_millis();
    let base = data
        .ip
        .clone()
        .unwrap_or_else(|| format!("anonymous_{}", now_ms));

    let hash = base.encode_utf16().fold(0i32, |acc, unit| {
        acc.wrapping_shl(5)
            .wrapping_sub(acc)
            .wrapping_add(i32::from(unit))
    });

    format!("{}.{}", hash.unsigned_abs(), now_ms)
}

#[derive(Debug, Serialize)]
pub struct Payload {
    pub client_id: String,
    pub timestamp_micros: i64,
    pub events: Vec<Event>,
}

#[derive(Debug, Serialize)]
pub struct Event {
    pub name: &'static str,
    pub params: Map<String, Value>,
}

/// Build the Measurement Protocol payload for one request
pub fn build_payload(data: &RequestData) -> Payload {
    let mut params = Map::new();
    params.insert("api_endpoint".into(), Value::from(data.endpoint.as_str()));

    let optional = [
        ("repository_id", &data.repository_id),
        ("user_ip", &data.ip),
        ("user_country", &data.country),
        ("request_origin", &data.origin),
        ("host_url", &data.host_url),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            params.insert(name.into(), Value::from(value.as_str()));
        }
    }
    // Query parameters are flattened last and win on name clashes
    params.extend(data.query_parameters.clone());

    Payload {
        client_id: client_id(data),
        timestamp_micros: data.timestamp.timestamp_micros(),
        events: vec![Event {
            name: EVENT_NAME,
            params,
        }],
    }
}

/// Sends request events when analytics is enabled
#[derive(Debug, Clone)]
pub struct AnalyticsReporter {
    client: reqwest::Client,
    endpoint: String,
    measurement_id: String,
    api_secret: String,
}

impl AnalyticsReporter {
    /// `None` when analytics is disabled
    pub fn from_config(config: &AnalyticsConfig) -> Result<Option<Self>, reqwest::Error> {
        if !config.enabled {
            return Ok(None);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Some(Self {
            client,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            measurement_id: config.measurement_id.clone(),
            api_secret: config.api_secret.clone(),
        }))
    }

    /// Fire and forget
    pub fn report(&self, data: RequestData) {
        let reporter = self.clone();
        tokio::spawn(async move {
            if let Err(e) = reporter.send(&data).await {
                warn!(error = %e, endpoint = data.endpoint.as_str(), "Failed to send analytics event");
            }
        });
    }

    pub async fn send(&self, data: &RequestData) -> Result<(), reqwest::Error> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("measurement_id", self.measurement_id.as_str()),
                ("api_secret", self.api_secret.as_str()),
            ])
            .json(&build_payload(data))
            .send()
            .await?;

        if response.status().is_success() {
            debug!(endpoint = data.endpoint.as_str(), "Sent analytics event");
        } else {
            warn!(status = %response.status(), "Analytics endpoint rejected event");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_query_values_are_coerced() {
        let parsed = parse_query_parameters(&query(&[
            ("w", "200"),
            ("q", "0.5"),
            ("flag", "TRUE"),
            ("off", "false"),
            ("url", "img/a.jpg"),
            ("blank", " "),
        ]));

        assert_eq!(parsed["w"], Value::from(200));
        assert_eq!(parsed["q"], Value::from(0.5));
        assert_eq!(parsed["flag"], Value::Bool(true));
        assert_eq!(parsed["off"], Value::Bool(false));
        assert_eq!(parsed["url"], Value::from("img/a.jpg"));
        assert_eq!(parsed["blank"], Value::from(" "));
    }

    #[test]
    fn test_repeated_query_keys_are_joined() {
        let parsed = parse_query_parameters(&query(&[("f", "webp"), ("f", "png")]));
        assert_eq!(parsed["f"], Value::from("webp,png"));
    }

    #[test]
    fn test_collect_reads_cloudflare_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.9"));
        headers.insert("cf-ipcountry", HeaderValue::from_static("JP"));
        headers.insert(header::REFERER, HeaderValue::from_static("https://site.example/page"));
        headers.insert(header::HOST, HeaderValue::from_static("cdn.example"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));

        let data = RequestData::collect(&headers, Some("docs"), Endpoint::Image, &[]);

        assert_eq!(data.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(data.country.as_deref(), Some("JP"));
        assert_eq!(data.origin.as_deref(), Some("https://site.example/page"));
        assert_eq!(data.host_url.as_deref(), Some("https://cdn.example"));
        assert_eq!(data.repository_id.as_deref(), Some("docs"));
    }

    #[test]
    fn test_origin_preferred_over_referer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://a.example"));
        headers.insert(header::REFERER, HeaderValue::from_static("https://b.example/x"));
        headers.insert(header::HOST, HeaderValue::from_static("cdn.example"));

        let data = RequestData::collect(&headers, None, Endpoint::Health, &[]);
        assert_eq!(data.origin.as_deref(), Some("https://a.example"));
        assert_eq!(data.host_url.as_deref(), Some("http://cdn.example"));
    }

    #[test]
    fn test_payload_shape() {
        let data = RequestData::collect(
            &HeaderMap::new(),
            Some("docs"),
            Endpoint::Content,
            &query(&[("src", "a.css")]),
        );
        let json = serde_json::to_value(build_payload(&data)).unwrap();

        assert_eq!(json["events"][0]["name"], "cdn_api_request");
        let params = &json["events"][0]["params"];
        assert_eq!(params["api_endpoint"], "content");
        assert_eq!(params["repository_id"], "docs");
        assert_eq!(params["src"], "a.css");
        assert!(params.get("user_ip").is_none());
        assert!(json["client_id"].as_str().unwrap().contains('.'));
    }

    #[test]
    fn test_client_id_is_stable_per_ip() {
        let mut data = RequestData::collect(&HeaderMap::new(), None, Endpoint::Health, &[]);
        data.ip = Some("198.51.100.7".into());
        let a = client_id(&data);
        let b = client_id(&data);
        assert_eq!(a.split('.').next(), b.split('.').next());
    }

    #[test]
    fn test_disabled_reporter() {
        assert!(AnalyticsReporter::from_config(&AnalyticsConfig::default())
            .unwrap()
            .is_none());
    }
}
