//! In-process Canvas stand-in for async tests.

use std::time::Duration;

use axum::http::{header, HeaderValue};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::config::{Config, PollPolicy};

pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock canvas");
    let addr = listener.local_addr().expect("mock canvas address");
    (listener, format!("http://{addr}"))
}

pub fn serve(listener: TcpListener, app: Router) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock canvas stopped");
    });
}

pub fn config(base_url: &str) -> Config {
    Config {
        base_url: base_url.to_string(),
        token: "test-token".to_string(),
        per_page: 100,
        poll: PollPolicy {
            interval: Duration::from_millis(5),
            max_attempts: 20,
        },
        log_level: "off".to_string(),
    }
}

pub fn student(user_id: u64, name: &str) -> Value {
    json!({
        "user_id": user_id,
        "type": "StudentEnrollment",
        "enrollment_state": "active",
        "user": {"name": name}
    })
}

pub fn submission(id: u64, user_id: u64, quiz_id: u64) -> Value {
    json!({"id": id, "user_id": user_id, "quiz_id": quiz_id, "attempt": 1})
}

pub fn with_link(mut response: Response, next: Option<String>) -> Response {
    if let Some(next) = next {
        let value = format!("<{next}>; rel=\"next\"");
        response.headers_mut().insert(
            header::LINK,
            HeaderValue::from_str(&value).expect("link header"),
        );
    }
    response
}
