//! End-to-end runs against a mock embedding server.

use charsim_pipeline::{
    AnalysisConfig, ApiFormat, ConnectionConfig, Record, RunOptions, RunRequest, TaskRunner,
    TaskState, WorkerMessage,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn records() -> Vec<Record> {
    vec![
        Record::new("alice.png", "Alice").with_field("description", "A cheerful bard"),
        Record::new("alicia.png", "Alicia").with_field("description", "A cheerful singer"),
        Record::new("grim.png", "Grim").with_field("description", "A gloomy knight"),
    ]
}

fn config(server: &MockServer) -> AnalysisConfig {
    AnalysisConfig::new(server.uri())
        .with_threshold(0.9)
        .with_options(RunOptions {
            fields: vec!["name".to_string(), "description".to_string()],
            ..RunOptions::default()
        })
}

async fn mount_embedding(server: &MockServer, input: &str, embedding: Vec<f32>) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({ "input": input })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": embedding, "index": 0 }]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_run_against_openai_compatible_server() {
    let server = MockServer::start().await;
    mount_embedding(&server, "Alice\nA cheerful bard", vec![0.9, 0.1, 0.0]).await;
    mount_embedding(&server, "Alicia\nA cheerful singer", vec![0.88, 0.12, 0.0]).await;
    mount_embedding(&server, "Grim\nA gloomy knight", vec![0.0, 0.1, 0.9]).await;

    let mut runner = TaskRunner::new();
    runner
        .start(RunRequest::new(records(), &config(&server)))
        .unwrap();
    let messages = runner.drain().await;

    assert_eq!(runner.state(), TaskState::Completed);
    let Some(WorkerMessage::Result(outcome)) = messages.last() else {
        panic!("expected a result last, got {:?}", messages.last());
    };

    assert_eq!(outcome.clusters.len(), 1);
    let mut members: Vec<&str> = outcome.clusters[0]
        .members
        .iter()
        .map(|m| m.id.as_str())
        .collect();
    members.sort_unstable();
    assert_eq!(members, vec!["alice.png", "alicia.png"]);

    // The loner is the most unique record.
    assert_eq!(outcome.uniqueness[0].id, "grim.png");
}

#[tokio::test]
async fn test_server_error_fails_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("out of memory"))
        .expect(1)
        .mount(&server)
        .await;

    let mut runner = TaskRunner::new();
    runner
        .start(RunRequest::new(records(), &config(&server)))
        .unwrap();
    let messages = runner.drain().await;

    assert_eq!(runner.state(), TaskState::Failed);
    assert!(
        !messages
            .iter()
            .any(|m| matches!(m, WorkerMessage::Result(_)))
    );
    assert_eq!(
        messages.last(),
        Some(&WorkerMessage::error(
            "protocol",
            "API error (500): out of memory"
        ))
    );
}

#[tokio::test]
async fn test_malformed_response_fails_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{}] })))
        .mount(&server)
        .await;

    let mut runner = TaskRunner::new();
    runner
        .start(RunRequest::new(records(), &config(&server)))
        .unwrap();
    let messages = runner.drain().await;

    assert!(matches!(
        messages.last(),
        Some(WorkerMessage::Error { kind, message })
            if kind == "response_shape" && message.contains("Alice")
    ));
}

#[tokio::test]
async fn test_simple_format_server() {
    let server = MockServer::start().await;
    for (text, embedding) in [
        ("Alice\nA cheerful bard", vec![1.0, 0.0]),
        ("Alicia\nA cheerful singer", vec![0.99, 0.02]),
        ("Grim\nA gloomy knight", vec![0.0, 1.0]),
    ] {
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(body_partial_json(json!({ "text": text })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "embedding": embedding })),
            )
            .mount(&server)
            .await;
    }

    let connection =
        ConnectionConfig::new(format!("{}/embed", server.uri())).with_api_format(ApiFormat::Simple);
    let config = config(&server).with_connection(connection);

    let mut runner = TaskRunner::new();
    runner.start(RunRequest::new(records(), &config)).unwrap();
    let messages = runner.drain().await;

    assert_eq!(runner.state(), TaskState::Completed);
    assert!(matches!(messages.last(), Some(WorkerMessage::Result(o)) if o.clusters.len() == 1));
}
