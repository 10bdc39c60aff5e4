mod common;

use std::sync::{Arc, Mutex};

use base64::Engine;
use serde_json::{json, Value};
use trendpost_core::config::AnalysisConfig;
use trendpost_core::error::CoreError;
use trendpost_core::period::ReportPeriod;
use trendpost_core::summary::assemble;
use trendpost_worker::analytics::auth::{ServiceAccountKey, TokenProvider, ANALYTICS_READONLY_SCOPE};
use trendpost_worker::analytics::{AnalyticsSource, Ga4Client};

use common::{ga4_router, Ga4Recorder, MockServer, SharedGa4, GA4_PROPERTY};

const TEST_KEY_PEM: &str = include_str!("fixtures/test_service_account_key.pem");

fn period() -> ReportPeriod {
    ReportPeriod::parse("2026-09-01", "2026-09-30").expect("period")
}

async fn server() -> (MockServer, SharedGa4) {
    let shared: SharedGa4 = Arc::new(Mutex::new(Ga4Recorder::default()));
    let server = MockServer::start(ga4_router(shared.clone())).await;
    (server, shared)
}

fn service_account(token_uri: &str) -> ServiceAccountKey {
    let raw = json!({
        "type": "service_account",
        "project_id": "trendpost-test",
        "private_key_id": "test-key-1",
        "private_key": TEST_KEY_PEM,
        "client_email": "reporter@trendpost-test.iam.gserviceaccount.com",
        "token_uri": token_uri,
    });
    ServiceAccountKey::from_json(&raw.to_string()).expect("service account")
}

#[tokio::test]
async fn fetches_full_bundle_with_static_token() {
    let (server, shared) = server().await;
    let client = Ga4Client::new(&server.url(), GA4_PROPERTY, TokenProvider::fixed("ya29.static"))
        .expect("client");

    let bundle = client.fetch_bundle(period()).await.expect("bundle");

    assert_eq!(bundle.period, period());
    assert_eq!(bundle.audience.total_users, Some(400));
    assert_eq!(bundle.audience.new_users, Some(180));
    assert_eq!(bundle.audience.sessions, Some(1000));
    assert_eq!(bundle.engagement.engagement_rate(), Some(35.0));
    assert_eq!(bundle.engagement.engaged_sessions(), Some(350));
    let average = bundle.engagement.average_engagement_time().expect("average");
    assert!((average - 90.0005).abs() < 1e-9);

    assert_eq!(bundle.acquisition.len(), 2);
    assert_eq!(bundle.acquisition[0].label(), "google/organic");
    assert_eq!(bundle.acquisition[1].users, 120);
    assert_eq!(bundle.geographic[0].label(), "Vienna, Austria");

    // form_submit counts, email_click fails upstream, phone_click has no rows.
    let counts: Vec<(&str, u64)> = bundle
        .conversions
        .categories
        .iter()
        .map(|c| (c.category.as_str(), c.count))
        .collect();
    assert_eq!(
        counts,
        vec![("form_submit", 12), ("email_click", 0), ("phone_click", 0)]
    );

    let recorder = shared.lock().expect("recorder");
    assert!(recorder.token_forms.is_empty());
    assert!(recorder
        .authorizations
        .iter()
        .all(|auth| auth == "Bearer ya29.static"));
    let first = &recorder.requests[0];
    assert_eq!(
        first["dateRanges"],
        json!([{"startDate": "2026-09-01", "endDate": "2026-09-30"}])
    );
}

#[tokio::test]
async fn ranked_reports_request_descending_limits() {
    let (server, shared) = server().await;
    let client = Ga4Client::new(&server.url(), GA4_PROPERTY, TokenProvider::fixed("t"))
        .expect("client");
    client.fetch_bundle(period()).await.expect("bundle");

    let recorder = shared.lock().expect("recorder");
    let ranked: Vec<&Value> = recorder
        .requests
        .iter()
        .filter(|r| r.get("orderBys").is_some())
        .collect();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0]["dimensions"][0]["name"], "sessionSource");
    assert_eq!(ranked[0]["limit"], "5");
    assert_eq!(ranked[0]["orderBys"][0]["desc"], true);
    assert_eq!(ranked[1]["dimensions"][0]["name"], "city");
    assert_eq!(ranked[1]["limit"], "10");
}

#[tokio::test]
async fn service_account_token_is_exchanged_once_and_cached() {
    let (server, shared) = server().await;
    let key = service_account(&format!("{}/token", server.url()));
    let client = Ga4Client::new(
        &server.url(),
        GA4_PROPERTY,
        TokenProvider::service_account(key, None),
    )
    .expect("client");

    client.fetch_bundle(period()).await.expect("first fetch");
    client
        .fetch_bundle(period().previous().expect("previous"))
        .await
        .expect("second fetch");

    let recorder = shared.lock().expect("recorder");
    assert_eq!(recorder.token_forms.len(), 1);
    assert!(recorder
        .authorizations
        .iter()
        .all(|auth| auth == "Bearer ya29.mock"));

    let form = &recorder.token_forms[0];
    assert!(form.starts_with("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"));
    let assertion = form
        .split('&')
        .find_map(|pair| pair.strip_prefix("assertion="))
        .expect("assertion");
    let parts: Vec<&str> = assertion.split('.').collect();
    assert_eq!(parts.len(), 3);

    let decode = |segment: &str| -> Value {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(segment)
            .expect("base64url");
        serde_json::from_slice(&bytes).expect("json")
    };
    let header = decode(parts[0]);
    assert_eq!(header["alg"], "RS256");
    assert_eq!(header["kid"], "test-key-1");
    let claims = decode(parts[1]);
    assert_eq!(
        claims["iss"],
        "reporter@trendpost-test.iam.gserviceaccount.com"
    );
    assert_eq!(claims["scope"], ANALYTICS_READONLY_SCOPE);
    assert_eq!(claims["aud"], format!("{}/token", server.url()));
    let iat = claims["iat"].as_i64().expect("iat");
    let exp = claims["exp"].as_i64().expect("exp");
    assert_eq!(exp - iat, 3600);
}

#[tokio::test]
async fn missing_metric_column_surfaces_as_incomplete_bundle() {
    let (server, shared) = server().await;
    shared.lock().expect("recorder").omit_sessions = true;
    let client = Ga4Client::new(&server.url(), GA4_PROPERTY, TokenProvider::fixed("t"))
        .expect("client");

    let current = client.fetch_bundle(period()).await.expect("current");
    assert_eq!(current.audience.sessions, None);
    assert_eq!(current.audience.total_users, Some(400));

    let previous = client
        .fetch_bundle(period().previous().expect("previous"))
        .await
        .expect("previous");
    let result = assemble(&current, &previous, period(), &AnalysisConfig::default());
    assert!(matches!(
        result,
        Err(CoreError::IncompleteBundle {
            bundle: "current",
            field: "sessions"
        })
    ));
}

#[tokio::test]
async fn denied_reports_fail_the_fetch() {
    let (server, shared) = server().await;
    shared.lock().expect("recorder").deny_reports = true;
    let client = Ga4Client::new(&server.url(), GA4_PROPERTY, TokenProvider::fixed("t"))
        .expect("client");

    let err = client.fetch_bundle(period()).await.expect_err("denied");
    let message = format!("{err:#}");
    assert!(message.contains("audience report"), "{message}");
    assert!(message.contains("403"), "{message}");
    assert!(client.check_connection().await.is_err());
}

#[tokio::test]
async fn connection_check_runs_a_small_report() {
    let (server, shared) = server().await;
    let client = Ga4Client::new(&server.url(), GA4_PROPERTY, TokenProvider::fixed("t"))
        .expect("client");
    client.check_connection().await.expect("connection");

    let recorder = shared.lock().expect("recorder");
    assert_eq!(recorder.requests.len(), 1);
    assert_eq!(recorder.requests[0]["metrics"], json!([{"name": "sessions"}]));
}
