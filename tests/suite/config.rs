//! Config file to running session

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use leadflow_backend::HttpBackend;
use leadflow_config::{ConfigError, LeadflowConfig};
use leadflow_engine::{EngineSettings, LeadForm, OpenError, backend_options};
use tempfile::NamedTempFile;
use wiremock::MockServer;

use crate::common::{context, mount_events, mount_form_config};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn config_file_drives_a_form_session() {
    let server = MockServer::start().await;
    mount_form_config(&server).await;
    mount_events(&server).await;

    let file = write_config(&format!(
        "[api]\nbase_url = \"{uri}\"\nvalidator_url = \"{uri}\"\n\n\
         [autosave]\ndebounce_ms = 25\n\n[validator]\nenabled = false\n",
        uri = server.uri()
    ));
    let config = LeadflowConfig::load_from(file.path()).unwrap();
    // Loopback hosts may use plain http without opting in.
    assert!(config.allow_insecure_http());

    let settings = EngineSettings::from_config(&config);
    assert_eq!(settings.debounce, Duration::from_millis(25));
    assert!(!settings.validator_enabled);

    let options = backend_options(&config).unwrap();
    let backend = Arc::new(HttpBackend::new(&options).unwrap());
    let form = LeadForm::open(context(), backend, None, &settings).await.unwrap();
    assert_eq!(form.form_config().client_name(), "Acme Imóveis");
    form.close().await;
}

#[test]
fn remote_plain_http_requires_opt_in() {
    let file = write_config("[api]\nbase_url = \"http://api.example.com\"\n");
    let config = LeadflowConfig::load_from(file.path()).unwrap();
    assert!(!config.allow_insecure_http());
}

#[tokio::test]
async fn plain_http_is_refused_when_opted_out() {
    let server = MockServer::start().await;
    mount_form_config(&server).await;

    let file = write_config(&format!(
        "[api]\nbase_url = \"{}\"\nallow_insecure_http = false\n\n[retry]\nmax_retries = 0\n",
        server.uri()
    ));
    let config = LeadflowConfig::load_from(file.path()).unwrap();
    let options = backend_options(&config).unwrap();
    let backend = Arc::new(HttpBackend::new(&options).unwrap());

    let result = LeadForm::open(context(), backend, None, &EngineSettings::from_config(&config)).await;
    assert!(matches!(result, Err(OpenError::Config(_))));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[test]
fn malformed_file_reports_its_path() {
    let file = write_config("[api\nbase_url = 1");
    let err = LeadflowConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert_eq!(err.path(), file.path());
}
