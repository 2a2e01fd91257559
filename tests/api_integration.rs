//! Integration tests for the REST surface.
//!
//! Each test spins up an Axum server on a random port backed by a fake relay
//! and a temp data directory, then exercises the real HTTP contract.

mod support;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mail_parser::{MessageParser, MimeHeaders};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use campaign_mailer::api::api_routes;
use campaign_mailer::config::ServerConfig;
use campaign_mailer::dispatch::Dispatcher;
use campaign_mailer::store::{Settings, SettingsStore};

use support::{CountingLimiter, FakeRelay, RelayLog, engine_with};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    port: u16,
    relay: Arc<RelayLog>,
    settings: Arc<SettingsStore>,
    server: Arc<ServerConfig>,
    _tmp: tempfile::TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    fn upload(&self, name: &str, contents: &str) {
        std::fs::write(self.server.upload_path(name), contents).unwrap();
    }
}

/// Start an Axum server on a random port.
async fn start_server() -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let server = Arc::new(ServerConfig {
        data_dir: tmp.path().to_path_buf(),
        upload_dir: tmp.path().join("uploads"),
        ..ServerConfig::default()
    });
    std::fs::create_dir_all(&server.upload_dir).unwrap();

    let (engine, relay) = engine_with(
        FakeRelay::default(),
        Arc::new(CountingLimiter::default()),
        tmp.path(),
    );
    let dispatcher = Dispatcher::new(engine);
    let settings = Arc::new(SettingsStore::new(server.settings_path()));
    let app = api_routes(dispatcher, Arc::clone(&settings), Arc::clone(&server));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        port,
        relay,
        settings,
        server,
        _tmp: tmp,
    }
}

async fn post_json(url: String, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let json = resp.json::<Value>().await.unwrap_or(Value::Null);
    (status, json)
}

async fn get_json(url: String) -> Value {
    reqwest::get(url).await.unwrap().json().await.unwrap()
}

async fn wait_for_idle(srv: &TestServer) {
    loop {
        let status = get_json(srv.url("/api/status")).await;
        if status["running"] == false {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn file_exists(dir: &Path, name: &str) -> bool {
    dir.join(name).exists()
}

// ── Health / status ──────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;
        let json = get_json(srv.url("/health")).await;
        assert_eq!(json["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn status_defaults_on_fresh_install() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;
        let json = get_json(srv.url("/api/status")).await;
        assert_eq!(json["cursor"], 0);
        assert_eq!(json["totalRecipients"], 0);
        assert_eq!(json["stopperLimit"], 100);
        assert_eq!(json["running"], false);
        assert_eq!(json["email"], "");
    })
    .await
    .expect("test timed out");
}

// ── Settings ─────────────────────────────────────────────────────────

#[tokio::test]
async fn credentials_require_sixteen_char_password() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;

        let (status, json) = post_json(
            srv.url("/api/save-credentials"),
            serde_json::json!({"email": "me@x.com", "password": "short"}),
        )
        .await;
        assert_eq!(status, 400);
        assert!(json["error"].as_str().unwrap().contains("16"));

        let (status, _) = post_json(
            srv.url("/api/save-credentials"),
            serde_json::json!({"email": "me@x.com", "password": "abcdefghijklmnop"}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(srv.settings.load().await.email.as_deref(), Some("me@x.com"));

        let (status, _) = post_json(srv.url("/api/credentials/clear"), Value::Null).await;
        assert_eq!(status, 200);
        let settings = srv.settings.load().await;
        assert!(settings.email.is_none());
        assert!(settings.password.is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn stopper_must_be_positive() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;

        let (status, _) =
            post_json(srv.url("/api/stopper"), serde_json::json!({"value": 0})).await;
        assert_eq!(status, 400);

        let (status, _) =
            post_json(srv.url("/api/stopper"), serde_json::json!({"value": "25"})).await;
        assert_eq!(status, 200);

        let json = get_json(srv.url("/api/status")).await;
        assert_eq!(json["stopperLimit"], 25);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn files_list_set_default_and_delete() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;
        srv.upload("list.csv", "email\na@x.com\n");
        srv.upload("resume.pdf", "pdf");

        let json = get_json(srv.url("/api/files")).await;
        assert_eq!(json["files"], serde_json::json!(["list.csv"]));
        assert_eq!(json["default_file"], Value::Null);

        let (status, _) = post_json(
            srv.url("/api/files/set-default"),
            serde_json::json!({"filename": "missing.csv"}),
        )
        .await;
        assert_eq!(status, 404);

        let (status, _) = post_json(
            srv.url("/api/files/set-default"),
            serde_json::json!({"filename": "../config.json"}),
        )
        .await;
        assert_eq!(status, 400);

        let (status, _) = post_json(
            srv.url("/api/files/set-default"),
            serde_json::json!({"filename": "list.csv"}),
        )
        .await;
        assert_eq!(status, 200);
        let json = get_json(srv.url("/api/status")).await;
        assert_eq!(json["totalRecipients"], 1);

        let (status, _) = post_json(
            srv.url("/api/files/delete"),
            serde_json::json!({"filename": "list.csv"}),
        )
        .await;
        assert_eq!(status, 200);
        assert!(!file_exists(&srv.server.upload_dir, "list.csv"));
        assert!(srv.settings.load().await.default_file.is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn templates_list_and_save() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;

        let json = get_json(srv.url("/api/templates")).await;
        assert!(json["templates"]["default"]["body"].is_string());
        assert!(json["templates"]["concise"]["subject"].is_string());

        let (status, _) = post_json(
            srv.url("/api/templates/save"),
            serde_json::json!({"name": "custom", "subject": "Hey", "body": "{greeting}!"}),
        )
        .await;
        assert_eq!(status, 200);

        let json = get_json(srv.url("/api/templates")).await;
        assert_eq!(json["current_template"]["subject"], "Hey");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn resume_delete_clears_selection() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;

        let (status, _) = post_json(srv.url("/api/resume/delete"), Value::Null).await;
        assert_eq!(status, 404);

        srv.upload("cv.pdf", "pdf");
        let (status, _) = post_json(
            srv.url("/api/resume/set-default"),
            serde_json::json!({"filename": "cv.pdf"}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(get_json(srv.url("/api/resume")).await["resume_file"], "cv.pdf");

        let (status, _) = post_json(srv.url("/api/resume/delete"), Value::Null).await;
        assert_eq!(status, 200);
        assert!(!file_exists(&srv.server.upload_dir, "cv.pdf"));
        assert_eq!(get_json(srv.url("/api/resume")).await["resume_file"], Value::Null);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn resume_selection_requires_an_uploaded_file() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;

        let (status, _) = post_json(
            srv.url("/api/resume/set-default"),
            serde_json::json!({"filename": "missing.pdf"}),
        )
        .await;
        assert_eq!(status, 404);

        let (status, _) = post_json(
            srv.url("/api/resume/set-default"),
            serde_json::json!({"filename": "../config.json"}),
        )
        .await;
        assert_eq!(status, 400);
        assert!(srv.settings.load().await.resume_file.is_none());
    })
    .await
    .expect("test timed out");
}

// ── Dispatch ─────────────────────────────────────────────────────────

#[tokio::test]
async fn send_runs_in_background_and_logs_progress() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;
        srv.upload("list.csv", "Email\nann@x.com\nbob@x.com\ncat@x.com\n");
        srv.settings
            .save(&Settings {
                email: Some("me@x.com".into()),
                password: Some("abcdefghijklmnop".into()),
                stopper: Some(2),
                default_file: Some("list.csv".into()),
                ..Settings::default()
            })
            .await
            .unwrap();

        let (status, json) = post_json(srv.url("/api/send"), Value::Null).await;
        assert_eq!(status, 202);
        assert_eq!(json["success"], true);

        wait_for_idle(&srv).await;

        let status = get_json(srv.url("/api/status")).await;
        assert_eq!(status["cursor"], 2);
        assert_eq!(status["totalRecipients"], 3);
        assert_eq!(srv.relay.attempts(), vec!["ann@x.com", "bob@x.com"]);

        let logs = get_json(srv.url("/api/logs")).await;
        let lines = logs["logs"].as_array().unwrap();
        assert!(
            lines
                .iter()
                .any(|l| l.as_str().unwrap().ends_with("SUCCESS: Email sent to bob@x.com (2/3)"))
        );
        assert!(lines[0].as_str().unwrap().starts_with('['));
        assert_eq!(logs["events"][0]["level"], "info");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn send_without_settings_logs_precondition_error() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;

        let (status, _) = post_json(srv.url("/api/send"), Value::Null).await;
        assert_eq!(status, 202);
        wait_for_idle(&srv).await;

        let logs = get_json(srv.url("/api/logs")).await;
        let events = logs["events"].as_array().unwrap();
        assert_eq!(events.last().unwrap()["level"], "error");
        assert_eq!(srv.relay.connects.load(std::sync::atomic::Ordering::SeqCst), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn counter_reset_returns_to_zero() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;
        std::fs::write(
            srv.server.cursor_path(),
            serde_json::json!({"counter": 7}).to_string(),
        )
        .unwrap();
        assert_eq!(get_json(srv.url("/api/status")).await["cursor"], 7);

        let (status, _) = post_json(srv.url("/api/counter/reset"), Value::Null).await;
        assert_eq!(status, 200);
        assert_eq!(get_json(srv.url("/api/status")).await["cursor"], 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn selected_attachment_is_sent_with_each_message() {
    timeout(TEST_TIMEOUT, async {
        let srv = start_server().await;
        srv.upload("list.csv", "Email\nann@x.com\n");
        srv.upload("cv.pdf", "%PDF-1.4 resume");
        srv.settings
            .save(&Settings {
                email: Some("me@x.com".into()),
                password: Some("abcdefghijklmnop".into()),
                default_file: Some("list.csv".into()),
                ..Settings::default()
            })
            .await
            .unwrap();

        let (status, _) = post_json(
            srv.url("/api/resume/set-default"),
            serde_json::json!({"filename": "cv.pdf"}),
        )
        .await;
        assert_eq!(status, 200);

        let (status, _) = post_json(srv.url("/api/send"), Value::Null).await;
        assert_eq!(status, 202);
        wait_for_idle(&srv).await;

        let delivered = srv.relay.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 1);
        let parsed = MessageParser::default().parse(&delivered[0]).unwrap();
        assert_eq!(parsed.attachment_count(), 1);
        assert_eq!(
            parsed.attachment(0).unwrap().attachment_name(),
            Some("cv.pdf")
        );
    })
    .await
    .expect("test timed out");
}
