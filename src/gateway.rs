use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::Range;

pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Every way a backend call can fail, flattened to something printable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Transport(String),
    #[error("HTTP error {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response from server: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    GetCategories,
    GetStats {
        range: Range,
    },
    LogTask {
        description: String,
    },
    StopTask,
    ClearRecent {
        minutes: u32,
    },
    UpdateTaskCategories {
        timestamp: String,
        project: String,
        task_type: String,
    },
}

impl ApiCall {
    pub fn method(&self) -> Method {
        match self {
            ApiCall::GetCategories | ApiCall::GetStats { .. } => Method::GET,
            ApiCall::LogTask { .. }
            | ApiCall::StopTask
            | ApiCall::ClearRecent { .. }
            | ApiCall::UpdateTaskCategories { .. } => Method::POST,
        }
    }

    pub fn path(&self) -> String {
        match self {
            ApiCall::GetCategories => "/get_categories".to_string(),
            ApiCall::GetStats { range } => format!("/get_stats?range={range}"),
            ApiCall::LogTask { .. } => "/log_task".to_string(),
            ApiCall::StopTask => "/stop_task".to_string(),
            ApiCall::ClearRecent { .. } => "/clear_recent".to_string(),
            ApiCall::UpdateTaskCategories { .. } => "/update_task_categories".to_string(),
        }
    }

    pub fn body(&self) -> Option<Value> {
        match self {
            ApiCall::GetCategories | ApiCall::GetStats { .. } | ApiCall::StopTask => None,
            ApiCall::LogTask { description } => Some(json!({ "description": description })),
            ApiCall::ClearRecent { minutes } => Some(json!({ "minutes": minutes })),
            ApiCall::UpdateTaskCategories {
                timestamp,
                project,
                task_type,
            } => Some(json!({
                "timestamp": timestamp,
                "project": project,
                "task_type": task_type,
            })),
        }
    }
}

pub trait Gateway: Send + Sync {
    fn send(&self, call: &ApiCall) -> Result<Value, GatewayError>;
}

pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| GatewayError::Transport(format!("failed to create HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "sending request");

        let is_post = method == Method::POST;
        let mut builder = self.client.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        } else if is_post {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }

        let response = builder.send().map_err(|err| {
            warn!(%url, error = %err, "request failed");
            GatewayError::Transport(err.to_string())
        })?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        normalize_response(status, &text)
    }
}

impl Gateway for HttpGateway {
    fn send(&self, call: &ApiCall) -> Result<Value, GatewayError> {
        let body = call.body();
        self.request(call.method(), &call.path(), body.as_ref())
    }
}

pub fn normalize_response(status: u16, text: &str) -> Result<Value, GatewayError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|value| error_message(&value))
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
        return Err(GatewayError::Status { status, message });
    }

    serde_json::from_str(text).map_err(|err| GatewayError::Decode(err.to_string()))
}

fn error_message(value: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use serde_json::json;

    use crate::domain::Range;

    use super::{ApiCall, Gateway, GatewayError, HttpGateway, normalize_response};

    #[test]
    fn uses_server_message_for_failed_status() {
        let err = normalize_response(400, r#"{"status":"error","message":"No description provided"}"#)
            .expect_err("400 should fail");
        assert_eq!(
            err,
            GatewayError::Status {
                status: 400,
                message: "No description provided".to_string(),
            }
        );
        assert_eq!(err.to_string(), "HTTP error 400: No description provided");
    }

    #[test]
    fn falls_back_to_generic_message_for_unreadable_error_body() {
        let err = normalize_response(502, "<html>bad gateway</html>").expect_err("502 should fail");
        assert_eq!(err.to_string(), "HTTP error 502: Unknown error");
    }

    #[test]
    fn rejects_garbled_success_body() {
        let err = normalize_response(200, r#"{"projects": {"#).expect_err("truncated json");
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[test]
    fn builds_paths_and_bodies_for_each_call() {
        assert_eq!(
            ApiCall::GetStats { range: Range::Week }.path(),
            "/get_stats?range=week"
        );
        assert_eq!(
            ApiCall::ClearRecent { minutes: 5 }.body(),
            Some(json!({ "minutes": 5 }))
        );
        assert_eq!(ApiCall::StopTask.body(), None);
        assert_eq!(ApiCall::StopTask.method(), reqwest::Method::POST);
    }

    #[test]
    fn posts_json_to_the_backend() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 44\r\nConnection: close\r\n\r\n{\"status\":\"success\",\"message\":\"Task logged\"}",
        );
        let gateway = HttpGateway::new(&base_url).expect("client should build");

        let reply = gateway
            .send(&ApiCall::LogTask {
                description: "write release notes".to_string(),
            })
            .expect("request should succeed");
        let request = server.join().expect("server thread");

        assert_eq!(reply["status"], "success");
        assert!(request.starts_with("POST /log_task "));
        assert!(request.to_lowercase().contains("content-type: application/json"));
        assert!(request.contains(r#""description":"write release notes""#));
    }

    #[test]
    fn reports_server_errors_with_their_message() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 500 INTERNAL SERVER ERROR\r\nContent-Type: application/json\r\nContent-Length: 52\r\nConnection: close\r\n\r\n{\"status\":\"error\",\"message\":\"Internal server error\"}",
        );
        let gateway = HttpGateway::new(&base_url).expect("client should build");

        let err = gateway
            .send(&ApiCall::GetStats { range: Range::Today })
            .expect_err("500 should fail");
        let request = server.join().expect("server thread");

        assert!(request.starts_with("GET /get_stats?range=today "));
        assert_eq!(err.to_string(), "HTTP error 500: Internal server error");
    }

    fn serve_once(response: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let address = listener.local_addr().expect("listener address");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept connection");
            let request = read_request(&mut stream);
            stream
                .write_all(response.as_bytes())
                .expect("write response");
            request
        });
        (format!("http://{address}"), handle)
    }

    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = stream.read(&mut chunk).expect("read request");
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..read]);

            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&raw).to_string()
    }
}
