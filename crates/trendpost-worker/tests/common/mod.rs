#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use trendpost_core::config::Config;
use trendpost_core::metrics::{
    AcquisitionEntry, AnalyticsBundle, AudienceMetrics, ConversionMetrics, EngagementMetrics,
    GeographicEntry,
};
use trendpost_core::period::ReportPeriod;
use trendpost_worker::analytics::AnalyticsSource;
use trendpost_worker::email::{ReportEmail, ReportMailer};
use trendpost_worker::llm::TextGenerator;
use trendpost_worker::retry::RetryPolicy;

pub fn config() -> Config {
    let env: HashMap<&str, &str> = HashMap::from([
        ("TRENDPOST_TARGET_WEBSITE", "example.com"),
        ("TRENDPOST_GA_PROPERTY_ID", "123456"),
        ("TRENDPOST_GA_ACCESS_TOKEN", "ya29.test"),
        ("TRENDPOST_LLM_API_KEY", "key"),
        ("TRENDPOST_SMTP_HOST", "smtp.example.com"),
        ("TRENDPOST_EMAIL_FROM", "reports@example.com"),
        ("TRENDPOST_EMAIL_TO", "owner@example.com"),
        ("TRENDPOST_ERROR_NOTIFICATION_EMAIL", "ops@example.com"),
        ("TRENDPOST_REPORT_INTERVAL_DAYS", "30"),
        ("TRENDPOST_TIMEZONE", "UTC"),
    ]);
    Config::from_lookup(|key| env.get(key).map(|v| v.to_string())).expect("config")
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

pub fn bundle(period: ReportPeriod, sessions: u64, users: u64, engagement_rate: f64) -> AnalyticsBundle {
    AnalyticsBundle {
        period,
        audience: AudienceMetrics::new(users, users / 2, sessions),
        engagement: EngagementMetrics::new(Some(engagement_rate), None, None).expect("engagement"),
        conversions: ConversionMetrics::new([("form_submit", 12)]),
        acquisition: vec![
            AcquisitionEntry::new("google", "organic", 200),
            AcquisitionEntry::new("(direct)", "(none)", 120),
        ],
        geographic: vec![GeographicEntry::new("Vienna", "Austria", 150)],
    }
}

/// Serves `current` for the period ending on `current_end` and `previous`
/// for anything else. Without `current_end` every period gets `current`.
pub struct FakeSource {
    pub current: AnalyticsBundle,
    pub previous: AnalyticsBundle,
    pub current_end: Option<NaiveDate>,
    /// Number of leading calls that fail.
    pub failures: usize,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(current: AnalyticsBundle, previous: AnalyticsBundle) -> Self {
        let current_end = Some(current.period.end());
        Self {
            current,
            previous,
            current_end,
            failures: 0,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AnalyticsSource for FakeSource {
    async fn fetch_bundle(&self, period: ReportPeriod) -> anyhow::Result<AnalyticsBundle> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            bail!("analytics API unavailable");
        }
        let mut bundle = match self.current_end {
            Some(end) if period.end() != end => self.previous.clone(),
            _ => self.current.clone(),
        };
        bundle.period = period;
        Ok(bundle)
    }

    async fn check_connection(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake_analytics"
    }
}

pub struct FakeGenerator {
    pub reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
    pub healthy: bool,
}

impl FakeGenerator {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
            healthy: true,
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
            healthy: false,
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("prompts").len()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, _system: &str, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().expect("prompts").push(prompt.to_string());
        match &self.reply {
            Some(text) => Ok(text.clone()),
            None => bail!("model overloaded"),
        }
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        if self.healthy {
            Ok(())
        } else {
            bail!("model endpoint unreachable")
        }
    }

    fn name(&self) -> &'static str {
        "fake_llm"
    }
}

#[derive(Default)]
pub struct FakeMailer {
    pub fail_sends: bool,
    pub reports: Mutex<Vec<ReportEmail>>,
    pub notifications: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeMailer {
    pub fn sent(&self) -> Vec<ReportEmail> {
        self.reports.lock().expect("reports").clone()
    }

    pub fn notified(&self) -> Vec<(String, Option<String>)> {
        self.notifications.lock().expect("notifications").clone()
    }
}

#[async_trait]
impl ReportMailer for FakeMailer {
    async fn send_report(&self, email: &ReportEmail) -> anyhow::Result<String> {
        if self.fail_sends {
            bail!("smtp send failed: connection refused");
        }
        let mut reports = self.reports.lock().expect("reports");
        reports.push(email.clone());
        Ok(format!("<fake-{}@example.com>", reports.len()))
    }

    async fn send_error_notification(
        &self,
        error: &str,
        details: Option<&str>,
    ) -> anyhow::Result<bool> {
        self.notifications
            .lock()
            .expect("notifications")
            .push((error.to_string(), details.map(str::to_string)));
        Ok(true)
    }

    async fn check_connection(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Binds `app` to an ephemeral local port until dropped.
pub struct MockServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockServer {
    pub async fn start(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("mock server");
        });
        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// GA4 Data API

#[derive(Default)]
pub struct Ga4Recorder {
    pub authorizations: Vec<String>,
    pub token_forms: Vec<String>,
    pub requests: Vec<Value>,
    /// Leave `sessions` out of the audience report's headers.
    pub omit_sessions: bool,
    /// Answer every runReport with 403.
    pub deny_reports: bool,
}

pub type SharedGa4 = Arc<Mutex<Ga4Recorder>>;

pub const GA4_PROPERTY: &str = "123456";

pub fn ga4_router(shared: SharedGa4) -> Router {
    Router::new()
        .route("/v1beta/properties/123456:runReport", post(handle_run_report))
        .route("/token", post(handle_token))
        .with_state(shared)
}

fn names(body: &Value, field: &str) -> Vec<String> {
    body[field]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn table(headers: &[&str], rows: Value) -> Value {
    let row_count = rows.as_array().map(Vec::len).unwrap_or(0);
    json!({
        "metricHeaders": headers.iter().map(|h| json!({"name": h, "type": "TYPE_INTEGER"})).collect::<Vec<_>>(),
        "rows": rows,
        "rowCount": row_count,
    })
}

async fn handle_run_report(
    State(shared): State<SharedGa4>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let (omit_sessions, deny) = {
        let mut recorder = shared.lock().expect("recorder");
        recorder.authorizations.push(
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        );
        recorder.requests.push(body.clone());
        (recorder.omit_sessions, recorder.deny_reports)
    };
    if deny {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": 403, "status": "PERMISSION_DENIED"}})),
        )
            .into_response();
    }

    let metrics = names(&body, "metrics");
    let dimensions = names(&body, "dimensions");
    let metric_refs: Vec<&str> = metrics.iter().map(String::as_str).collect();
    let response = match (dimensions.first().map(String::as_str), metric_refs.as_slice()) {
        (None, ["totalUsers", "newUsers", "sessions"]) if omit_sessions => table(
            &["totalUsers", "newUsers"],
            json!([{"metricValues": [{"value": "400"}, {"value": "180"}]}]),
        ),
        (None, ["totalUsers", "newUsers", "sessions"]) => table(
            &["totalUsers", "newUsers", "sessions"],
            json!([{"metricValues": [{"value": "400"}, {"value": "180"}, {"value": "1000"}]}]),
        ),
        (None, ["userEngagementDuration", "engagedSessions", "sessions"]) => table(
            &["userEngagementDuration", "engagedSessions", "sessions"],
            json!([{"metricValues": [{"value": "90000.5"}, {"value": "350"}, {"value": "1000"}]}]),
        ),
        (None, ["sessions"]) => table(&["sessions"], json!([{"metricValues": [{"value": "31"}]}])),
        (Some("sessionSource"), _) => table(
            &["totalUsers"],
            json!([
                {"dimensionValues": [{"value": "google"}, {"value": "organic"}], "metricValues": [{"value": "200"}]},
                {"dimensionValues": [{"value": "(direct)"}, {"value": "(none)"}], "metricValues": [{"value": "120"}]}
            ]),
        ),
        (Some("city"), _) => table(
            &["totalUsers"],
            json!([
                {"dimensionValues": [{"value": "Vienna"}, {"value": "Austria"}], "metricValues": [{"value": "150"}]}
            ]),
        ),
        (Some("eventName"), _) => {
            match body["dimensionFilter"]["filter"]["stringFilter"]["value"].as_str() {
                Some("form_submit") => table(
                    &["eventCount"],
                    json!([{"dimensionValues": [{"value": "form_submit"}], "metricValues": [{"value": "12"}]}]),
                ),
                Some("email_click") => {
                    return (StatusCode::BAD_REQUEST, "unknown event").into_response();
                }
                _ => table(&["eventCount"], json!([])),
            }
        }
        _ => return (StatusCode::BAD_REQUEST, "unexpected report").into_response(),
    };
    Json(response).into_response()
}

async fn handle_token(State(shared): State<SharedGa4>, body: String) -> Json<Value> {
    shared.lock().expect("recorder").token_forms.push(body);
    Json(json!({
        "access_token": "ya29.mock",
        "expires_in": 3599,
        "token_type": "Bearer"
    }))
}

// ---------------------------------------------------------------------------
// Language models

#[derive(Clone)]
pub enum LlmBehavior {
    Reply(String),
    /// Gemini: no candidates and a block reason.
    Blocked,
    Status(u16),
}

pub struct LlmRecorder {
    pub behavior: LlmBehavior,
    pub requests: Vec<Value>,
    pub api_keys: Vec<String>,
}

pub type SharedLlm = Arc<Mutex<LlmRecorder>>;

pub fn shared_llm(behavior: LlmBehavior) -> SharedLlm {
    Arc::new(Mutex::new(LlmRecorder {
        behavior,
        requests: Vec::new(),
        api_keys: Vec::new(),
    }))
}

pub fn llm_router(shared: SharedLlm) -> Router {
    Router::new()
        .route(
            "/v1beta/models/gemini-2.5-flash:generateContent",
            post(handle_generate_content),
        )
        .route("/v1beta/models/gemini-2.5-flash", get(handle_model))
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/models", get(handle_model))
        .with_state(shared)
}

fn record(shared: &SharedLlm, headers: &HeaderMap, body: Value) -> LlmBehavior {
    let mut recorder = shared.lock().expect("recorder");
    let key = headers
        .get("x-goog-api-key")
        .or_else(|| headers.get("authorization"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    recorder.api_keys.push(key);
    recorder.requests.push(body);
    recorder.behavior.clone()
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn handle_generate_content(
    State(shared): State<SharedLlm>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    match record(&shared, &headers, body) {
        LlmBehavior::Reply(text) => {
            let finish_reason = if text.is_empty() { "MAX_TOKENS" } else { "STOP" };
            Json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": text}]},
                    "finishReason": finish_reason
                }]
            }))
            .into_response()
        }
        LlmBehavior::Blocked => {
            Json(json!({"promptFeedback": {"blockReason": "SAFETY"}})).into_response()
        }
        LlmBehavior::Status(code) => (status(code), "upstream error").into_response(),
    }
}

async fn handle_chat_completions(
    State(shared): State<SharedLlm>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    match record(&shared, &headers, body) {
        LlmBehavior::Reply(text) => Json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        LlmBehavior::Blocked => Json(json!({"choices": []})).into_response(),
        LlmBehavior::Status(code) => (status(code), "upstream error").into_response(),
    }
}

async fn handle_model(State(shared): State<SharedLlm>) -> Response {
    let behavior = shared.lock().expect("recorder").behavior.clone();
    match behavior {
        LlmBehavior::Status(code) => (status(code), "unavailable").into_response(),
        _ => Json(json!({"name": "models/gemini-2.5-flash", "data": []})).into_response(),
    }
}
