//! Form sessions against a mock lead backend

use leadflow_engine::{Advance, Affordance, LeadForm, OpenError, StepPosition, SubmissionError};
use leadflow_types::{FieldKey, LeadId};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    backend, bodies, context, event_types, eventually, mount_events, mount_form_config,
    mount_partial, settings, verifier,
};

fn set(form: &LeadForm, key: &str, value: &str) {
    form.steps().set_value(&FieldKey::new(key), value).unwrap();
}

async fn open(server: &MockServer) -> LeadForm {
    LeadForm::open(context(), backend(server), Some(verifier(server)), &settings())
        .await
        .unwrap()
}

#[tokio::test]
async fn missing_form_config_fails_to_open() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forms/config/c1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "unknown client"})))
        .mount(&server)
        .await;

    let result = LeadForm::open(context(), backend(&server), None, &settings()).await;
    let Err(OpenError::Config(err)) = result else {
        panic!("expected a config error");
    };
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.detail(), "unknown client");
}

#[tokio::test]
async fn identity_step_autosaves_and_reuses_issued_lead_id() {
    let server = MockServer::start().await;
    mount_form_config(&server).await;
    mount_events(&server).await;
    mount_partial(&server, "abc").await;

    let form = open(&server).await;
    assert_eq!(form.steps().plan().len(), 3);

    set(&form, "full_name", "Ana");
    set(&form, "phone", "11987654321");
    assert_eq!(form.steps().advance(1).unwrap(), Advance::Next(2));

    assert!(eventually(|| async { form.lead_id().is_some() }).await);
    assert_eq!(form.lead_id(), Some(LeadId::new("abc")));

    let first = bodies(&server, "POST", "/leads/partial").await;
    assert_eq!(first[0]["name"], "Ana");
    assert_eq!(first[0]["phone"], "11987654321");
    assert_eq!(first[0]["last_step"], 2);
    assert_eq!(first[0]["utm_data"]["utm_source"], "ig");
    assert!(first[0].get("lead_id").is_none());

    set(&form, "property_type", "House");
    form.steps().advance(2).unwrap();
    assert!(
        eventually(|| async { bodies(&server, "POST", "/leads/partial").await.len() >= 2 }).await
    );
    let second = bodies(&server, "POST", "/leads/partial").await;
    assert_eq!(second[1]["lead_id"], "abc");
    assert_eq!(second[1]["last_step"], 3);

    form.close().await;
}

#[tokio::test]
async fn full_submission_reaches_success() {
    let server = MockServer::start().await;
    mount_form_config(&server).await;
    mount_events(&server).await;
    mount_partial(&server, "abc").await;
    Mock::given(method("GET"))
        .and(path("/api/cpf/v1/52998224725"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cpf": "52998224725"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/leads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "score": 72,
            "lead_id": "abc",
            "whatsapp_link": "https://wa.me/5511999999999"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let form = open(&server).await;
    set(&form, "full_name", "Ana");
    set(&form, "phone", "11987654321");
    form.steps().advance(1).unwrap();
    set(&form, "property_type", "Apartment");
    form.steps().advance(2).unwrap();
    set(&form, "income_range", ">10k");
    set(&form, "cpf", "529.982.247-25");

    let payload = form.submit(true).await.unwrap();
    assert_eq!(payload.score, Some(72));
    assert_eq!(payload.whatsapp_link.as_deref(), Some("https://wa.me/5511999999999"));
    assert_eq!(form.steps().position(), StepPosition::Success);
    assert_eq!(form.affordance(), Affordance::Done);
    assert!(matches!(form.submit(true).await, Err(SubmissionError::AlreadySubmitted)));

    let submits = bodies(&server, "POST", "/leads").await;
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0]["consent_given"], true);
    assert_eq!(submits[0]["form_data"]["income_range"], ">10k");
    assert_eq!(submits[0]["utm_data"]["utm_source"], "ig");

    form.close().await;
    let types = event_types(&server).await;
    assert_eq!(types.first().map(String::as_str), Some("page_view"));
    assert!(types.iter().any(|t| t == "form_submit"));
    assert!(!types.iter().any(|t| t == "form_abandon"));
}

#[tokio::test]
async fn submission_without_consent_never_reaches_the_backend() {
    let server = MockServer::start().await;
    mount_form_config(&server).await;
    mount_events(&server).await;
    mount_partial(&server, "abc").await;

    let form = open(&server).await;
    set(&form, "full_name", "Ana");
    set(&form, "phone", "11987654321");
    form.steps().advance(1).unwrap();
    set(&form, "property_type", "House");
    form.steps().advance(2).unwrap();
    set(&form, "income_range", "<5k");

    let err = form.submit(false).await.unwrap_err();
    assert!(matches!(err, SubmissionError::ConsentRequired));
    assert_eq!(form.affordance(), Affordance::Enabled);
    assert_eq!(form.steps().position(), StepPosition::Step(3));
    assert!(bodies(&server, "POST", "/leads").await.is_empty());

    form.close().await;
    assert!(event_types(&server).await.iter().any(|t| t == "form_abandon"));
}

#[tokio::test]
async fn rejected_submission_keeps_answers_and_allows_retry() {
    let server = MockServer::start().await;
    mount_form_config(&server).await;
    mount_events(&server).await;
    mount_partial(&server, "abc").await;
    Mock::given(method("POST"))
        .and(path("/leads"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "error", "detail": "duplicate lead"})),
        )
        .mount(&server)
        .await;

    let form = open(&server).await;
    set(&form, "full_name", "Ana");
    set(&form, "phone", "11987654321");
    form.steps().advance(1).unwrap();
    set(&form, "property_type", "House");
    form.steps().advance(2).unwrap();
    set(&form, "income_range", "<5k");

    let err = form.submit(true).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Backend(_)));
    assert!(err.user_message().contains("duplicate lead"));
    assert_eq!(form.affordance(), Affordance::Enabled);
    assert_eq!(form.steps().position(), StepPosition::Step(3));
    assert_eq!(
        form.steps().value(&FieldKey::new("income_range")).as_deref(),
        Some("<5k")
    );

    form.close().await;
}

#[tokio::test]
async fn invalid_national_id_blocks_submission_locally() {
    let server = MockServer::start().await;
    mount_form_config(&server).await;
    mount_events(&server).await;
    mount_partial(&server, "abc").await;

    let form = open(&server).await;
    set(&form, "full_name", "Ana");
    set(&form, "phone", "11987654321");
    form.steps().advance(1).unwrap();
    set(&form, "property_type", "House");
    form.steps().advance(2).unwrap();
    set(&form, "income_range", "<5k");
    set(&form, "cpf", "529.982.247-24");

    let err = form.submit(true).await.unwrap_err();
    assert!(matches!(err, SubmissionError::InvalidField { .. }));
    assert!(bodies(&server, "POST", "/leads").await.is_empty());
    let lookups = server.received_requests().await.unwrap_or_default();
    assert!(!lookups.iter().any(|r| r.url.path().starts_with("/api/cpf")));

    form.close().await;
}
