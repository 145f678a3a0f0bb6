#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests: a LanceDB index on disk and a mocked Ollama server

use mindcare_assistant::config::Config;
use mindcare_assistant::index::{DistanceMetric, Document, IndexEntry, IndexManifest, LanceIndex};
use mindcare_assistant::{Assistant, AssistantError, AskState, ErrorKind, Language};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EMBEDDING_MODEL: &str = "mxbai-embed-large";

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn clinic_entry(id: &str, name: &str, city: &str, phone: &str, vector: Vec<f32>) -> IndexEntry {
    IndexEntry {
        document: Document::new(id, format!("Nom: {name}\nVille: {city}\nTéléphone: {phone}"))
            .with_metadata("nom", name)
            .with_metadata("ville", city)
            .with_metadata("telephone", phone),
        vector,
    }
}

async fn write_clinic_index(index_dir: &Path, model: &str) {
    LanceIndex::write(
        index_dir,
        IndexManifest::new(model, 4, DistanceMetric::Cosine),
        &[
            clinic_entry("x", "Clinic X", "Casablanca", "0522000000", vec![1.0, 0.0, 0.0, 0.0]),
            clinic_entry("y", "Centre Y", "Rabat", "0537111111", vec![0.0, 1.0, 0.0, 0.0]),
            clinic_entry("z", "Hôpital Z", "Fès", "0535222222", vec![0.0, 0.0, 1.0, 0.0]),
        ],
    )
    .await
    .expect("should write index");
}

fn create_test_config(temp_dir: &TempDir, server: &MockServer) -> Config {
    let address = server.address();
    let mut config = Config::with_base_dir(temp_dir.path());
    config.ollama.host = address.ip().to_string();
    config.ollama.port = address.port();
    config.ollama.embedding_model = EMBEDDING_MODEL.to_string();
    config.ollama.retry_attempts = 1;
    config.retrieval.index_path = Some(temp_dir.path().join("index"));
    config.retrieval.top_k = 1;
    config
}

async fn mount_embedding(server: &MockServer, vector: &[f32]) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "model": EMBEDDING_MODEL })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [vector] })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn answers_with_the_retrieved_clinic() {
    init_test_tracing();

    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    write_clinic_index(&temp_dir.path().join("index"), EMBEDDING_MODEL).await;
    mount_embedding(&server, &[0.9, 0.1, 0.0, 0.0]).await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("0522000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Clinic X se trouve à Casablanca, téléphone 0522000000.",
            "done": true
        })))
        .expect(2)
        .mount(&server)
        .await;

    let assistant = Assistant::initialize(&create_test_config(&temp_dir, &server))
        .await
        .expect("assistant should initialize");
    let mut session = assistant.session();

    let answer = session
        .ask("Quel est le numéro de Clinic X à Casablanca ?")
        .await
        .expect("ask should succeed");
    assert!(answer.contains("Clinic X"));
    assert!(answer.contains("0522000000"));

    session
        .ask("Et son adresse ?")
        .await
        .expect("follow-up should succeed");

    assert_eq!(session.state(), AskState::Done);
    assert_eq!(session.memory().len(), 4);
    assert_eq!(session.language(), Language::French);
}

#[tokio::test(flavor = "multi_thread")]
async fn follow_up_prompt_carries_history() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    write_clinic_index(&temp_dir.path().join("index"), EMBEDDING_MODEL).await;
    mount_embedding(&server, &[0.0, 1.0, 0.0, 0.0]).await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("Utilisateur: Je cherche un centre à Rabat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Le numéro du Centre Y est 0537111111.",
            "done": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Centre Y se trouve à Rabat.",
            "done": true
        })))
        .mount(&server)
        .await;

    let assistant = Assistant::initialize(&create_test_config(&temp_dir, &server))
        .await
        .expect("assistant should initialize");
    let mut session = assistant.session();

    let first = session
        .ask("Je cherche un centre à Rabat")
        .await
        .expect("first ask");
    let second = session.ask("Quel est son numéro ?").await.expect("second ask");

    assert_eq!(first, "Centre Y se trouve à Rabat.");
    assert_eq!(second, "Le numéro du Centre Y est 0537111111.");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_index_fails_initialization() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;

    let result = Assistant::initialize(&create_test_config(&temp_dir, &server)).await;

    let error = result.err().expect("initialization should fail");
    assert!(matches!(error, AssistantError::IndexNotFound { .. }));
    assert_eq!(error.kind(), ErrorKind::IndexNotFound);
    assert!(!error.is_retryable());
}

#[tokio::test(flavor = "multi_thread")]
async fn index_from_another_model_is_refused() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    write_clinic_index(&temp_dir.path().join("index"), "nomic-embed-text").await;

    let result = Assistant::initialize(&create_test_config(&temp_dir, &server)).await;

    assert!(matches!(
        result.err(),
        Some(AssistantError::IndexVersionMismatch { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn ollama_outage_leaves_session_usable() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    write_clinic_index(&temp_dir.path().join("index"), EMBEDDING_MODEL).await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_embedding(&server, &[0.0, 0.0, 1.0, 0.0]).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Hôpital Z se trouve à Fès.",
            "done": true
        })))
        .mount(&server)
        .await;

    let assistant = Assistant::initialize(&create_test_config(&temp_dir, &server))
        .await
        .expect("assistant should initialize");
    let mut session = assistant.session();

    let error = session
        .ask("Un hôpital à Fès ?")
        .await
        .expect_err("first ask should fail");
    assert!(matches!(error, AssistantError::ProviderUnavailable(_)));
    assert_eq!(session.state(), AskState::Failed);
    assert!(session.memory().is_empty());

    let answer = session.ask("Un hôpital à Fès ?").await.expect("retry should succeed");
    assert_eq!(answer, "Hôpital Z se trouve à Fès.");
    assert_eq!(session.memory().len(), 2);
}
