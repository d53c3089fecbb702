//! Controller HTTP client against a mock server

use std::time::Duration;

use datacol_core::{Gateway, HttpController};
use serde_json::json;
use wiremock::matchers::{body_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> Gateway {
    let controller =
        HttpController::new(&server.uri(), "datacol", "s3cret", Duration::from_secs(5)).unwrap();
    Gateway::new(Box::new(controller), "demo")
}

#[tokio::test]
async fn test_list_apps_sends_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apps"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apps": [
                {"name": "web", "status": "running", "endpoint": "web.example.com"},
                {"name": "worker", "status": "deploying"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let apps = gateway(&server).list_apps().await.unwrap();
    assert_eq!(apps.len(), 2);
    assert_eq!(apps[0].endpoint.as_deref(), Some("web.example.com"));
    assert_eq!(apps[1].status.as_deref(), Some("deploying"));
}

#[tokio::test]
async fn test_create_app_posts_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apps"))
        .and(body_json(json!({"name": "web"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "web"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = gateway(&server).create_app("web").await.unwrap();
    assert_eq!(app.name, "web");
}

#[tokio::test]
async fn test_remote_error_message_is_passed_through() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/apps/web"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "app web not found"})),
        )
        .mount(&server)
        .await;

    let err = gateway(&server).delete_app("web").await.unwrap_err();
    assert!(err.is_remote());
    assert_eq!(
        err.to_string(),
        "app delete failed for stack 'demo': app web not found"
    );
}

#[tokio::test]
async fn test_environment_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apps/web/environment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"PORT": "8080", "DATABASE_URL": "postgres://db"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/apps/web/environment"))
        .and(body_json(json!({"data": "PORT=9090\n"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let env = gateway.get_environment("web").await.unwrap();
    assert_eq!(
        env.keys().collect::<Vec<_>>(),
        vec!["DATABASE_URL", "PORT"]
    );
    gateway.set_environment("web", "PORT=9090\n").await.unwrap();
}

#[tokio::test]
async fn test_restart_and_process_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apps/web/restart"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/apps/web/processes"))
        .and(body_json(json!({"command": ["rake", "db:migrate"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "exit_code": 1,
            "stdout": "",
            "stderr": "migration failed"
        })))
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    gateway.restart_app("web").await.unwrap();
    let response = gateway
        .run_process("web", &["rake".to_string(), "db:migrate".to_string()])
        .await
        .unwrap();
    assert_eq!(response.exit_code, 1);
    assert_eq!(response.stderr, "migration failed");
}

#[tokio::test]
async fn test_log_stream_relays_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apps/web/logs"))
        .and(query_param("follow", "false"))
        .and(query_param("since", "120s"))
        .respond_with(ResponseTemplate::new(200).set_body_string("line 1\nline 2\nline 3\n"))
        .expect(1)
        .mount(&server)
        .await;

    let mut sink = Vec::new();
    gateway(&server)
        .stream_app_logs("web", false, Duration::from_secs(120), &mut sink)
        .await
        .unwrap();
    assert_eq!(sink, b"line 1\nline 2\nline 3\n");
}

#[tokio::test]
async fn test_log_stream_open_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apps/web/logs"))
        .respond_with(ResponseTemplate::new(500).set_body_string("controller unavailable"))
        .mount(&server)
        .await;

    let mut sink = Vec::new();
    let err = gateway(&server)
        .stream_app_logs("web", true, Duration::from_secs(60), &mut sink)
        .await
        .unwrap_err();
    assert!(sink.is_empty());
    assert!(err.to_string().contains("controller unavailable"));
}
