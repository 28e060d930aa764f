//! Common test utilities for demux integration tests.
//!
//! Provides wiremock responders, a lesson signal fixture, and a harness
//! wiring a demuxer to an in-memory store.

// Shared across test binaries; not every binary uses every helper.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use wiremock::{Request, Respond, ResponseTemplate};

use demux::{App, DemuxConfig, DemuxError, Demuxer, MemoryStore, Occurrence, Signal, SignalRegistry};

pub const SECRET_A: &str = "demux_test_secret_alpha";
pub const SECRET_B: &str = "demux_test_secret_beta";

// ---------------------------------------------------------------------------
// CapturedRequest - for inspecting delivered signals
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("captured body is not JSON")
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }

    /// Verify the X-Demux-Signature header against the captured body.
    pub fn signature_valid(&self, secret: &str) -> bool {
        match self.header("x-demux-signature") {
            Some(signature) => demux::crypto::verify_signature(signature, secret, &self.body),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - captures requests and returns a fixed status
// ---------------------------------------------------------------------------

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl CaptureResponder {
    /// Create a capture responder that returns 200 OK.
    pub fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(200)
    }
}

// ---------------------------------------------------------------------------
// DelayedResponder - adds response delay
// ---------------------------------------------------------------------------

/// A wiremock responder that delays before responding.
#[derive(Clone)]
pub struct DelayedResponder {
    delay_ms: u64,
}

impl DelayedResponder {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

impl Respond for DelayedResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_delay(Duration::from_millis(self.delay_ms))
    }
}

// ---------------------------------------------------------------------------
// Lesson signal fixture
// ---------------------------------------------------------------------------

/// Event descriptor for lesson changes, the standard test signal.
pub struct LessonSignal {
    pub lesson_id: i64,
    pub account_id: i64,
}

impl LessonSignal {
    pub fn from_occurrence(occurrence: &Occurrence) -> Self {
        Self {
            lesson_id: occurrence.object_id,
            account_id: occurrence.account_id,
        }
    }
}

impl Signal for LessonSignal {
    fn signal_name(&self) -> &str {
        "lesson"
    }

    fn signal_class(&self) -> &str {
        "lesson"
    }

    fn account_id(&self) -> i64 {
        self.account_id
    }

    fn object_id(&self) -> i64 {
        self.lesson_id
    }

    fn payload_for(
        &self,
        _action: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, DemuxError> {
        let mut payload = serde_json::Map::new();
        payload.insert("company_id".to_string(), json!(self.account_id));
        payload.insert(
            "lesson".to_string(),
            json!({
                "id": self.lesson_id,
                "name": "Intro to Demuxing",
                "public": true
            }),
        );
        Ok(payload)
    }
}

/// Build an occurrence the way `LessonSignal::trigger` would.
pub fn lesson_occurrence(action: &str, account_id: i64, lesson_id: i64) -> Occurrence {
    LessonSignal {
        lesson_id,
        account_id,
    }
    .trigger(action, BTreeMap::new())
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A demuxer wired to an in-memory store, with the lesson signal registered.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub demuxer: Demuxer,
}

/// Build a harness with a short transport timeout and HTTP allowed (wiremock
/// serves plain HTTP on loopback).
pub fn harness() -> Harness {
    harness_with_timeout(Duration::from_secs(2))
}

pub fn harness_with_timeout(timeout: Duration) -> Harness {
    let store = Arc::new(MemoryStore::new());

    let mut signals = SignalRegistry::new();
    signals.register("lesson", |occurrence| {
        Ok(Box::new(LessonSignal::from_occurrence(occurrence)) as Box<dyn Signal>)
    });

    let config = DemuxConfig::default()
        .with_allow_http(true)
        .with_signal_timeout(timeout);

    let demuxer = Demuxer::new(store.clone(), Arc::new(signals), config)
        .expect("failed to build demuxer");

    Harness { store, demuxer }
}

/// Register an app with a signal URL and connect an account to it.
pub async fn connect_app(
    harness: &Harness,
    name: &str,
    secret: &str,
    signal_url: &str,
    account_id: i64,
    signals: Vec<String>,
) -> App {
    let app = App::new(name, secret).with_signal_url(signal_url);
    harness.store.insert_app(app.clone()).await.unwrap();
    harness
        .store
        .insert_connection(demux::Connection::new(
            app.id,
            account_id,
            "account",
            signals,
        ))
        .await
        .unwrap();
    app
}
