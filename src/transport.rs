//! Signed HTTP transmission of a delivery, producing a receipt.

use std::collections::BTreeMap;

use reqwest::Client;

use crate::config::DemuxConfig;
use crate::crypto;
use crate::error::DemuxError;
use crate::models::{App, DeliveryStatus};
use crate::validation;

static EMPTY_HEADERS: BTreeMap<String, String> = BTreeMap::new();

/// The fully built outbound request for one delivery: destination URL,
/// serialized body, and the exact headers to send (including the signature).
#[derive(Debug, Clone)]
pub struct SignalRequest {
    pub url: String,
    pub signal_name: String,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl SignalRequest {
    /// Build a signed request for delivering an action payload to an app.
    ///
    /// Body is JSON `{action, ...payload}`. The signature header carries a
    /// hex HMAC-SHA256 of the exact body keyed by the app's secret, so the
    /// app can verify authenticity.
    pub fn build(
        app: &App,
        signal_name: &str,
        action: &str,
        payload: serde_json::Map<String, serde_json::Value>,
        config: &DemuxConfig,
    ) -> Result<Self, DemuxError> {
        let url = app
            .signal_url
            .clone()
            .ok_or_else(|| DemuxError::InvalidUrl(format!("app {} has no signal_url", app.id)))?;
        validation::validate_signal_url(&url, config.allow_http)?;

        let mut body_map = serde_json::Map::new();
        body_map.insert("action".to_string(), serde_json::json!(action));
        body_map.extend(payload);
        let body = serde_json::to_string(&serde_json::Value::Object(body_map))?;

        let signature = crypto::sign_payload(&app.secret, body.as_bytes());

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("User-Agent".to_string(), config.user_agent.clone());
        headers.insert("X-Demux-Signal".to_string(), signal_name.to_string());
        headers.insert("X-Demux-Signature".to_string(), signature);

        Ok(Self {
            url,
            signal_name: signal_name.to_string(),
            body,
            headers,
        })
    }
}

/// Outcome of one transport attempt. Folded into the delivery's terminal
/// fields, never persisted on its own.
#[derive(Debug, Clone)]
pub enum Receipt {
    /// No request was ever sent or no response was ever received
    /// (pre-flight validation failure).
    Empty,
    /// The destination responded.
    Delivered {
        code: u16,
        headers: BTreeMap<String, String>,
        body: String,
    },
    /// Connection, write, or read failed or timed out.
    TimedOut { error: String },
}

impl Receipt {
    /// Terminal delivery status this receipt maps to.
    pub fn status(&self) -> DeliveryStatus {
        match self {
            Receipt::Empty => DeliveryStatus::Failure,
            Receipt::Delivered { code, .. } if (200..300).contains(code) => {
                DeliveryStatus::Success
            }
            Receipt::Delivered { .. } => DeliveryStatus::Failure,
            Receipt::TimedOut { .. } => DeliveryStatus::RequestTimeout,
        }
    }

    /// Was the response 2xx?
    pub fn success(&self) -> bool {
        self.status() == DeliveryStatus::Success
    }

    /// HTTP code of the response, if one was received.
    pub fn http_code(&self) -> Option<u16> {
        match self {
            Receipt::Delivered { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Headers of the response; empty when no response was received.
    pub fn response_headers(&self) -> &BTreeMap<String, String> {
        match self {
            Receipt::Delivered { headers, .. } => headers,
            _ => &EMPTY_HEADERS,
        }
    }

    /// Body of the response; empty when no response was received.
    pub fn response_body(&self) -> &str {
        match self {
            Receipt::Delivered { body, .. } => body,
            _ => "",
        }
    }
}

/// Performs the signed HTTP delivery with timeout handling.
///
/// One shared client; the configured timeout applies uniformly to the
/// connect, write, and read phases of each POST. No retry is performed
/// here; retry, if any, is the re-resolution path layered on top.
#[derive(Clone)]
pub struct Transport {
    client: Client,
}

impl Transport {
    /// Build a transport with a shared HTTP client.
    pub fn new(config: &DemuxConfig) -> Result<Self, DemuxError> {
        let client = Client::builder()
            .timeout(config.signal_timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DemuxError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Issue one POST for the request and translate the outcome to a receipt.
    ///
    /// Network-layer failures are caught here and become receipts; this never
    /// returns an error to the caller.
    pub async fn deliver(&self, request: &SignalRequest) -> Receipt {
        tracing::debug!(
            target: "demux",
            signal = %request.signal_name,
            url = %request.url,
            "sending signal"
        );

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &request.headers {
            let name = match name.parse::<reqwest::header::HeaderName>() {
                Ok(n) => n,
                Err(_) => continue,
            };
            if let Ok(v) = value.parse() {
                headers.insert(name, v);
            }
        }

        let result = self
            .client
            .post(&request.url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await;

        match result {
            Ok(response) => {
                let code = response.status().as_u16();
                let headers = headers_to_map(response.headers());
                let body = response
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(4096)
                    .collect::<String>();

                Receipt::Delivered {
                    code,
                    headers,
                    body,
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    format!("request error: {e}")
                };
                Receipt::TimedOut { error }
            }
        }
    }
}

/// Convert a reqwest HeaderMap to an ordered map of strings.
fn headers_to_map(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (name, value) in headers.iter() {
        if let Ok(v) = value.to_str() {
            map.insert(name.to_string(), v.to_string());
        }
    }
    map
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new("slack", "s3cret").with_signal_url("https://slack.test/demux")
    }

    #[test]
    fn test_build_request_body_and_headers() {
        let mut payload = serde_json::Map::new();
        payload.insert("lesson_id".to_string(), serde_json::json!(42));

        let request = SignalRequest::build(
            &app(),
            "lesson",
            "updated",
            payload,
            &DemuxConfig::default(),
        )
        .unwrap();

        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["action"], "updated");
        assert_eq!(body["lesson_id"], 42);

        assert_eq!(request.headers["Content-Type"], "application/json");
        assert_eq!(request.headers["User-Agent"], "demux/0.1");
        assert_eq!(request.headers["X-Demux-Signal"], "lesson");
        assert!(crypto::verify_signature(
            &request.headers["X-Demux-Signature"],
            "s3cret",
            request.body.as_bytes()
        ));
    }

    #[test]
    fn test_build_requires_signal_url() {
        let app = App::new("dormant", "s3cret");
        let result = SignalRequest::build(
            &app,
            "lesson",
            "updated",
            serde_json::Map::new(),
            &DemuxConfig::default(),
        );
        assert!(matches!(result, Err(DemuxError::InvalidUrl(_))));
    }

    #[test]
    fn test_build_rejects_http_url_by_default() {
        let app = App::new("slack", "s3cret").with_signal_url("http://slack.test/demux");
        let result = SignalRequest::build(
            &app,
            "lesson",
            "updated",
            serde_json::Map::new(),
            &DemuxConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_receipt_status_mapping() {
        let ok = Receipt::Delivered {
            code: 204,
            headers: BTreeMap::new(),
            body: String::new(),
        };
        assert_eq!(ok.status(), DeliveryStatus::Success);
        assert!(ok.success());

        let rejected = Receipt::Delivered {
            code: 404,
            headers: BTreeMap::new(),
            body: String::new(),
        };
        assert_eq!(rejected.status(), DeliveryStatus::Failure);

        let timed_out = Receipt::TimedOut {
            error: "request timed out".into(),
        };
        assert_eq!(timed_out.status(), DeliveryStatus::RequestTimeout);
    }

    #[test]
    fn test_empty_receipt_degrades_gracefully() {
        let receipt = Receipt::Empty;
        assert_eq!(receipt.status(), DeliveryStatus::Failure);
        assert_eq!(receipt.http_code(), None);
        assert!(receipt.response_headers().is_empty());
        assert_eq!(receipt.response_body(), "");
    }
}
