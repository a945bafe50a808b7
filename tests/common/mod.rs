//! Shared test utilities and fixtures
//!
//! Every test talks to a wiremock server through the real HTTP backend.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use leadflow_backend::{
    BackendOptions, HttpBackend, HttpNationalIdVerifier, LeadBackend, NationalIdVerifier,
    RetryConfig,
};
use leadflow_engine::EngineSettings;
use leadflow_types::{AttributionContext, ClientId, LinkId, SessionId, UtmTags};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Short debounce so real-time tests stay fast.
pub const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

pub fn options(server: &MockServer) -> BackendOptions {
    let url = server.uri().parse().unwrap();
    BackendOptions::new(url, server.uri().parse().unwrap())
        .allow_insecure_http(true)
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(2))
        .with_retry(RetryConfig {
            max_retries: 1,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            jitter_factor: 0.0,
        })
}

pub fn backend(server: &MockServer) -> Arc<dyn LeadBackend> {
    Arc::new(HttpBackend::new(&options(server)).unwrap())
}

pub fn verifier(server: &MockServer) -> Arc<dyn NationalIdVerifier> {
    Arc::new(HttpNationalIdVerifier::new(&options(server)).unwrap())
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        debounce: TEST_DEBOUNCE,
        validator_timeout: Duration::from_millis(500),
        telemetry_close_timeout: Duration::from_secs(1),
        ..EngineSettings::default()
    }
}

pub fn context() -> AttributionContext {
    AttributionContext::new(ClientId::new("c1"))
        .with_link(LinkId::new("l1"))
        .with_session(SessionId::new("s1"))
        .with_utm(UtmTags {
            source: Some("ig".to_string()),
            ..UtmTags::default()
        })
}

pub fn form_config_json() -> Value {
    json!({
        "client_name": "Acme Imóveis",
        "fields": [
            {"field_key": "full_name", "label": "Full name", "required": true, "order": 1},
            {"field_key": "phone", "label": "Phone", "required": true, "order": 2},
            {"field_key": "property_type", "type": "radio", "label": "Property",
             "required": true, "options": "[\"House\", \"Apartment\"]", "order": 3},
            {"field_key": "income_range", "type": "select", "label": "Income",
             "required": true, "options": ["<5k", "5k-10k", ">10k"], "order": 4},
            {"field_key": "cpf", "label": "CPF", "order": 5}
        ]
    })
}

pub async fn mount_form_config(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/forms/config/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(form_config_json()))
        .mount(server)
        .await;
}

pub async fn mount_events(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/funnel/event"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(server)
        .await;
}

pub async fn mount_partial(server: &MockServer, lead_id: &str) {
    Mock::given(method("POST"))
        .and(path("/leads/partial"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "success", "lead_id": lead_id})),
        )
        .mount(server)
        .await;
}

/// JSON bodies of every request the server saw on `route`.
pub async fn bodies(server: &MockServer, verb: &str, route: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == route)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

/// Event types posted so far, in arrival order.
pub async fn event_types(server: &MockServer) -> Vec<String> {
    bodies(server, "POST", "/funnel/event")
        .await
        .into_iter()
        .map(|e| e["event_type"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// Poll until `check` holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..40 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
