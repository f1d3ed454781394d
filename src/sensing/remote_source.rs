//! remote_source.rs
//! Remote temperature source: one instant query per read against a
//! Prometheus-compatible HTTP API (`GET /api/v1/query`).
//!
//! Accepted result shapes:
//! - `scalar` → `[ts, "value"]`
//! - `vector` → `[{"metric": {..}, "value": [ts, "value"]}, ..]`, first element wins.
//!
//! The configured query is expected to aggregate to a single series already
//! (e.g. `max(...)`); taking the first element of a longer vector is the caller's risk.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::Deserialize;

use crate::config::humantime_serde;
use crate::error::{ReadError, SourceError};

pub const DEFAULT_QUERY: &str = r#"max(node_hwmon_temp_celsius{sensor="temp0"})"#;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const QUERY_PATH: &str = "/api/v1/query";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct RemoteQueryConfig {
    /// `http://host:port` or `https://host:port`.
    pub host: String,
    /// Query expression; `DEFAULT_QUERY` when unset.
    pub query: Option<String>,
    /// Per-request timeout; `DEFAULT_TIMEOUT` when unset.
    #[serde(with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
    pub auth: Option<BasicAuth>,
}

impl RemoteQueryConfig {
    pub fn query_or_default(&self) -> &str {
        match self.query.as_deref() {
            Some(q) if !q.trim().is_empty() => q,
            _ => DEFAULT_QUERY,
        }
    }

    pub fn timeout_or_default(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

pub struct RemoteQuerySource {
    client: reqwest::Client,
    endpoint: String,
    query: String,
    timeout: Duration,
    auth: Option<BasicAuth>,
    closed: bool,
}

impl std::fmt::Debug for RemoteQuerySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // credentials stay out of logs
        f.debug_struct("RemoteQuerySource")
            .field("endpoint", &self.endpoint)
            .field("query", &self.query)
            .field("timeout", &self.timeout)
            .field("auth", &self.auth.as_ref().map(|a| a.username.as_str()))
            .finish()
    }
}

impl RemoteQuerySource {
    pub fn new(config: &RemoteQueryConfig) -> Result<Self, SourceError> {
        let host = config.host.trim();
        if host.is_empty() {
            return Err(SourceError::MissingHost);
        }
        if !host.starts_with("http://") && !host.starts_with("https://") {
            return Err(SourceError::InvalidHost(host.to_string()));
        }

        let timeout = config.timeout_or_default();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SourceError::Client)?;

        let auth = config
            .auth
            .clone()
            .filter(|a| !a.username.is_empty());

        Ok(Self {
            client,
            endpoint: format!("{}{}", host.trim_end_matches('/'), QUERY_PATH),
            query: config.query_or_default().to_string(),
            timeout,
            auth,
            closed: false,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn query_expr(&self) -> &str {
        &self.query
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the instant query at the current time and returns the temperature in °C.
    pub async fn query(&self) -> Result<f64, ReadError> {
        if self.closed {
            return Err(ReadError::Closed);
        }

        let eval_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let eval_time = format!("{:.3}", eval_time);

        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("query", self.query.as_str()), ("time", eval_time.as_str())]);

        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request.send().await.map_err(|e| self.request_error(e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.request_error(e))?;

        debug!(
            "[Source] {} answered HTTP {} ({} bytes)",
            self.endpoint,
            status.as_u16(),
            body.len()
        );

        parse_query_response(status.as_u16(), &body)
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    fn request_error(&self, e: reqwest::Error) -> ReadError {
        if e.is_timeout() {
            ReadError::Timeout(self.timeout)
        } else {
            ReadError::Request(e)
        }
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    value: (f64, String),
}

/// Decodes an instant-query response body into a single temperature.
pub fn parse_query_response(status: u16, body: &[u8]) -> Result<f64, ReadError> {
    let envelope: QueryEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) if (200..300).contains(&status) => return Err(ReadError::Decode(e)),
        Err(_) => {
            return Err(ReadError::QueryFailed {
                kind: format!("http {}", status),
                message: String::from_utf8_lossy(body).trim().chars().take(200).collect(),
            });
        }
    };

    for w in &envelope.warnings {
        warn!("[Source] remote query warning: {}", w);
    }

    if envelope.status != "success" || !(200..300).contains(&status) {
        return Err(ReadError::QueryFailed {
            kind: envelope
                .error_type
                .unwrap_or_else(|| format!("http {}", status)),
            message: envelope.error.unwrap_or_else(|| envelope.status.clone()),
        });
    }

    let data = envelope.data.ok_or(ReadError::NoResult)?;
    if data.result.is_null() {
        return Err(ReadError::NoResult);
    }

    let raw = match data.result_type.as_str() {
        "scalar" => {
            let (_ts, value): (f64, String) = serde_json::from_value(data.result)?;
            value
        }
        "vector" => {
            let samples: Vec<VectorSample> = serde_json::from_value(data.result)?;
            if samples.len() > 1 {
                debug!(
                    "[Source] query returned {} series, using the first",
                    samples.len()
                );
            }
            let first = samples.into_iter().next().ok_or(ReadError::NoResult)?;
            first.value.1
        }
        other => return Err(ReadError::UnexpectedResultType(other.to_string())),
    };

    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ReadError::InvalidSample(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_result_takes_first_series() {
        let body = br#"{"status":"success","data":{"resultType":"vector","result":[
            {"metric":{"instance":"a"},"value":[1700000000.123,"48.5"]},
            {"metric":{"instance":"b"},"value":[1700000000.123,"71.0"]}]}}"#;
        assert_eq!(parse_query_response(200, body).unwrap(), 48.5);
    }

    #[test]
    fn scalar_result_is_accepted() {
        let body = br#"{"status":"success","data":{"resultType":"scalar","result":[1700000000,"52"]}}"#;
        assert_eq!(parse_query_response(200, body).unwrap(), 52.0);
    }

    #[test]
    fn empty_vector_is_no_result() {
        let body = br#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
        assert!(matches!(parse_query_response(200, body), Err(ReadError::NoResult)));
    }

    #[test]
    fn missing_data_is_no_result() {
        let body = br#"{"status":"success"}"#;
        assert!(matches!(parse_query_response(200, body), Err(ReadError::NoResult)));
    }

    #[test]
    fn matrix_result_is_rejected() {
        let body = br#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#;
        match parse_query_response(200, body) {
            Err(ReadError::UnexpectedResultType(t)) => assert_eq!(t, "matrix"),
            other => panic!("expected unexpected result type, got {:?}", other),
        }
    }

    #[test]
    fn api_error_is_surfaced() {
        let body = br#"{"status":"error","errorType":"bad_data","error":"parse error at char 4"}"#;
        match parse_query_response(400, body) {
            Err(ReadError::QueryFailed { kind, message }) => {
                assert_eq!(kind, "bad_data");
                assert_eq!(message, "parse error at char 4");
            }
            other => panic!("expected query failure, got {:?}", other),
        }
    }

    #[test]
    fn non_json_error_page_is_query_failure() {
        match parse_query_response(502, b"<html>Bad Gateway</html>") {
            Err(ReadError::QueryFailed { kind, .. }) => assert_eq!(kind, "http 502"),
            other => panic!("expected query failure, got {:?}", other),
        }
    }

    #[test]
    fn non_finite_sample_is_rejected() {
        let body = br#"{"status":"success","data":{"resultType":"scalar","result":[1,"NaN"]}}"#;
        assert!(matches!(
            parse_query_response(200, body),
            Err(ReadError::InvalidSample(_))
        ));
    }

    #[test]
    fn warnings_do_not_fail_the_read() {
        let body = br#"{"status":"success","warnings":["partial response"],
            "data":{"resultType":"scalar","result":[1,"40.25"]}}"#;
        assert_eq!(parse_query_response(200, body).unwrap(), 40.25);
    }

    #[test]
    fn host_must_carry_a_scheme() {
        let cfg = RemoteQueryConfig {
            host: "prometheus:9090".into(),
            ..Default::default()
        };
        assert!(matches!(
            RemoteQuerySource::new(&cfg),
            Err(SourceError::InvalidHost(_))
        ));

        let cfg = RemoteQueryConfig::default();
        assert!(matches!(
            RemoteQuerySource::new(&cfg),
            Err(SourceError::MissingHost)
        ));
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = RemoteQueryConfig {
            host: "http://prometheus:9090/".into(),
            query: Some("   ".into()),
            ..Default::default()
        };
        let source = RemoteQuerySource::new(&cfg).unwrap();
        assert_eq!(source.endpoint(), "http://prometheus:9090/api/v1/query");
        assert_eq!(source.query_expr(), DEFAULT_QUERY);
        assert_eq!(source.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn debug_output_hides_password() {
        let cfg = RemoteQueryConfig {
            host: "http://prometheus:9090".into(),
            auth: Some(BasicAuth {
                username: "admin".into(),
                password: "hunter2".into(),
            }),
            ..Default::default()
        };
        let source = RemoteQuerySource::new(&cfg).unwrap();
        let rendered = format!("{:?}", source);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn config_parses_humantime_timeout() {
        let cfg: RemoteQueryConfig = serde_yaml::from_str(
            "host: http://prom:9090\ntimeout: 750ms\nauth:\n  username: admin\n",
        )
        .unwrap();
        assert_eq!(cfg.timeout, Some(Duration::from_millis(750)));
        assert_eq!(cfg.auth.unwrap().password, "");
    }
}
