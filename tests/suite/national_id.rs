//! National id checks against a mock registry

use std::time::Duration;

use leadflow_engine::ExternalFieldValidator;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::verifier;

async fn validator_answering(status: u16) -> (MockServer, ExternalFieldValidator) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cpf/v1/52998224725"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    let validator = ExternalFieldValidator::new(verifier(&server), Duration::from_millis(500));
    (server, validator)
}

#[tokio::test]
async fn registry_acceptance_passes() {
    let (_server, validator) = validator_answering(200).await;
    assert!(validator.check("529.982.247-25").await);
}

#[tokio::test]
async fn registry_refusal_fails() {
    let (_server, validator) = validator_answering(404).await;
    assert!(!validator.check("529.982.247-25").await);
}

#[tokio::test]
async fn registry_outage_fails_open() {
    let (_server, validator) = validator_answering(503).await;
    assert!(validator.check("529.982.247-25").await);
}

#[tokio::test]
async fn slow_registry_fails_open() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cpf/v1/52998224725"))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_secs(1)))
        .mount(&server)
        .await;
    let validator = ExternalFieldValidator::new(verifier(&server), Duration::from_millis(100));
    assert!(validator.check("52998224725").await);
}

#[tokio::test]
async fn local_rejection_skips_the_registry() {
    let (server, validator) = validator_answering(200).await;
    assert!(!validator.check("111.111.111-11").await);
    assert!(!validator.check("529.982.247-24").await);
    assert!(!validator.check("1234").await);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn empty_value_passes_without_lookup() {
    let (server, validator) = validator_answering(404).await;
    assert!(validator.check("   ").await);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
