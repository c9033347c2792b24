//! HTTP integration tests for the PulseBridge REST API
//!
//! Every test spawns a full agent system on a private bus and drives it
//! through `build_router` with the Axum `oneshot` approach. The doctor
//! directory is served by a wiremock server where a test needs doctors.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pulse_core::{create_directory, create_enhancer, KnowledgeRegistry, MessageBus, PulseConfig};
use pulse_server::agents;
use pulse_server::http::{build_router, HttpState};
use pulse_server::router::AppContext;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASE_CONFIG: &str = r#"
[service]
socket_path = "/tmp/pulse-http-integration.sock"
log_level = "info"

[agents]
coordinator = "coordinator"
triage = "triage"
cardiology = "cardiology"
neurology = "neurology"
dermatology = "dermatology"
default_specialist = "cardiology"

[sessions]
poll_timeout_seconds = 5
poll_interval_ms = 20
"#;

/// Spawn the agents for `config` and wrap them in router state.
async fn make_http_state(config: &str) -> (Arc<HttpState>, broadcast::Sender<()>) {
    let config = Arc::new(PulseConfig::from_toml_str(config).unwrap());
    let bus = MessageBus::new();
    let (tx, _) = broadcast::channel(1);
    let coordinator = agents::spawn_agents(
        &config,
        &bus,
        &KnowledgeRegistry::load(),
        create_enhancer(&config.enhancer),
        create_directory(&config.doctors),
        &tx,
    )
    .await
    .unwrap();
    let ctx = AppContext::new(config, bus, coordinator);
    (Arc::new(HttpState { ctx }), tx)
}

async fn send(state: Arc<HttpState>, req: Request<Body>) -> (StatusCode, Value) {
    let resp = build_router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// ===========================================================================
// TEST 1: GET /version via oneshot — returns version and protocol
// ===========================================================================
#[tokio::test]
async fn test_version_endpoint_integration() {
    let (state, _shutdown) = make_http_state(BASE_CONFIG).await;
    let (status, json) = send(state, get("/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["version"].is_string());
    assert_eq!(json["protocol"], "pulse/1");
}

// ===========================================================================
// TEST 2: GET /health — every configured agent answers
// ===========================================================================
#[tokio::test]
async fn test_health_endpoint_all_agents() {
    let (state, _shutdown) = make_http_state(BASE_CONFIG).await;
    let (status, json) = send(state, get("/health")).await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["agents"].as_array().unwrap().len(), 4);
    assert_eq!(json["coordinator"]["status"], "healthy");
}

// ===========================================================================
// TEST 3: POST /consult — cardiology consultation with doctors from the
// HTTP directory
// ===========================================================================
#[tokio::test]
async fn test_consult_with_http_directory() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "Ada Heart", "specialization": "Cardiology", "email": "ada@clinic.test"},
            {"name": "Nils Nerve", "specialization": "Neurology", "email": null}
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = format!(
        "{}\n[doctors]\nsource = \"http\"\nurl = \"{}/doctors\"\n",
        BASE_CONFIG,
        mock_server.uri()
    );
    let (state, _shutdown) = make_http_state(&config).await;

    let (status, json) = send(
        state,
        post(
            "/consult",
            json!({
                "message": "I have severe chest pain when I exercise and shortness of breath",
                "age": 45,
                "history": ["hypertension", "diabetes"]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["success"], true);
    assert_eq!(json["type"], "result");
    assert_eq!(json["metadata"]["specialty"], "cardiology");
    assert_eq!(json["metadata"]["condition"], "angina");
    assert_eq!(json["metadata"]["doctors_found"], 1);
    let text = json["response"].as_str().unwrap();
    assert!(text.contains("Dr. Ada Heart - Cardiology"));
    assert!(text.contains("Email: ada@clinic.test"));
    assert!(!text.contains("Nils Nerve"));
}

// ===========================================================================
// TEST 4: POST /consult — directory down still completes the consultation
// ===========================================================================
#[tokio::test]
async fn test_consult_with_failing_directory() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doctors"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let config = format!(
        "{}\n[doctors]\nsource = \"http\"\nurl = \"{}/doctors\"\n",
        BASE_CONFIG,
        mock_server.uri()
    );
    let (state, _shutdown) = make_http_state(&config).await;

    let (status, json) = send(state, post("/consult", json!({"message": "itchy rash"}))).await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["success"], true);
    assert_eq!(json["metadata"]["doctors_found"], 0);
    assert!(json["response"]
        .as_str()
        .unwrap()
        .contains("Doctor matching temporarily unavailable"));
}

// ===========================================================================
// TEST 5: POST /consult — missing message is a 400
// ===========================================================================
#[tokio::test]
async fn test_consult_requires_message() {
    let (state, _shutdown) = make_http_state(BASE_CONFIG).await;
    let (status, json) = send(state, post("/consult", json!({"age": 30}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "message field is required");
}

// ===========================================================================
// TEST 6: POST /consult — no triage agent is a user-visible failure
// ===========================================================================
#[tokio::test]
async fn test_consult_without_triage() {
    let config = BASE_CONFIG.replace("triage = \"triage\"\n", "");
    let (state, _shutdown) = make_http_state(&config).await;
    let (status, json) = send(state, post("/consult", json!({"message": "itchy rash"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["type"], "error");
    assert!(json["response"]
        .as_str()
        .unwrap()
        .starts_with("I apologize, but I encountered an error:"));
}

// ===========================================================================
// TEST 7: POST /route — neurology routing with urgency
// ===========================================================================
#[tokio::test]
async fn test_route_endpoint() {
    let (state, _shutdown) = make_http_state(BASE_CONFIG).await;
    let (status, json) = send(
        state,
        post("/route", json!({"symptoms": "sudden numbness and weakness", "age": 70})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["recommended_specialty"], "neurology");
    assert_eq!(json["routing_fallback"], false);
    assert!(json["reasoning"]
        .as_str()
        .unwrap()
        .starts_with("Triage analysis routed symptoms to Neurology"));
}

// ===========================================================================
// TEST 8: POST /analyze — single dermatology analysis
// ===========================================================================
#[tokio::test]
async fn test_analyze_endpoint() {
    let (state, _shutdown) = make_http_state(BASE_CONFIG).await;
    let (status, json) = send(
        state,
        post(
            "/analyze",
            json!({"specialty": "dermatology", "symptoms": "a dark mole that is changing shape"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["specialty"], "dermatology");
    assert_eq!(json["condition"], "melanoma");
    assert_eq!(json["enhanced"], false);
}

// ===========================================================================
// TEST 9: POST /analyze — malformed JSON body is rejected by the extractor
// ===========================================================================
#[tokio::test]
async fn test_analyze_rejects_malformed_body() {
    let (state, _shutdown) = make_http_state(BASE_CONFIG).await;
    let req = Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = build_router(state).oneshot(req).await.unwrap();
    assert!(resp.status().is_client_error());
}
