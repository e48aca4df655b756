//! Shared helpers for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use edgequake_docconv::{ConvertError, ConverterInvoker, JobObserver, JobState};
use http_body_util::BodyExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub const BOUNDARY: &str = "----docconv-test-boundary";

/// Route library logs to the test writer; `RUST_LOG=debug` shows transitions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Build a `multipart/form-data` request for `POST /convert` carrying a file.
pub fn convert_request(file_name: &str, bytes: &[u8], fields: &[(&str, &str)]) -> Request<Body> {
    multipart_request(Some((file_name, bytes)), fields)
}

/// Same as [`convert_request`] but with no file part.
pub fn convert_request_without_file(fields: &[(&str, &str)]) -> Request<Body> {
    multipart_request(None, fields)
}

fn multipart_request(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(multipart_body(file, fields)))
        .unwrap()
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Raw `multipart/form-data` bytes: the text fields, then the file part.
pub fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Drain a response body.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// Drain a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn header_str<'a>(response: &'a Response<Body>, name: header::HeaderName) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// What [`FakeInvoker`] does when called.
#[derive(Clone, Copy, Debug)]
pub enum Behaviour {
    /// Write `<stem>.<token>` containing a marker plus the input bytes.
    Succeed,
    /// Exit non-zero with this stderr.
    FailWith(&'static str),
    /// Exit zero, write nothing.
    SucceedWithoutOutput,
}

/// In-process stand-in for LibreOffice.
pub struct FakeInvoker {
    pub behaviour: Behaviour,
    pub calls: AtomicUsize,
    pub tokens: Mutex<Vec<String>>,
}

impl FakeInvoker {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConverterInvoker for FakeInvoker {
    async fn convert(&self, input: &Path, token: &str, out_dir: &Path) -> Result<(), ConvertError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.to_string());
        match self.behaviour {
            Behaviour::Succeed => {
                let stem = input.file_stem().unwrap().to_string_lossy().into_owned();
                let mut bytes = format!("converted-to-{token}:").into_bytes();
                bytes.extend(tokio::fs::read(input).await.unwrap());
                tokio::fs::write(out_dir.join(format!("{stem}.{token}")), bytes)
                    .await
                    .unwrap();
                Ok(())
            }
            Behaviour::FailWith(stderr) => Err(ConvertError::ConversionExecution {
                status: "exit status: 1".into(),
                stderr: stderr.into(),
            }),
            Behaviour::SucceedWithoutOutput => Ok(()),
        }
    }
}

/// Records every job's outcome.
#[derive(Default)]
pub struct OutcomeRecorder {
    pub outcomes: Mutex<Vec<JobState>>,
    pub cleaned: AtomicUsize,
}

impl JobObserver for OutcomeRecorder {
    fn on_transition(&self, _job: Uuid, _from: JobState, to: JobState) {
        if to == JobState::Cleaned {
            self.cleaned.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_job_complete(&self, _job: Uuid, outcome: JobState) {
        self.outcomes.lock().unwrap().push(outcome);
    }
}
