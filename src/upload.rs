//! Artifact upload to the gallery API.
//!
//! One multipart POST per session, no retry. Everything that can go wrong
//! here is reported as a value; the session always completes regardless.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use thiserror::Error;

/// Default network timeout for the upload call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Why an upload did not succeed.
///
/// A timeout is deliberately distinguishable from an HTTP-status failure:
/// the operator needs to know whether the API rejected the GIF or never
/// saw it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("upload failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upload timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outcome of one upload attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Preconditions not met (no endpoint, missing file); no network call
    /// was made.
    NotAttempted { reason: String },
    /// 200/201 response. Carries the parsed JSON body, or a wrapped
    /// plain-text payload when the body is not JSON.
    Success(serde_json::Value),
    Failed(UploadError),
}

/// Client for the gallery upload endpoint.
pub struct Uploader {
    endpoint: Option<String>,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl Uploader {
    /// Build an uploader. `endpoint` may be absent, in which case every
    /// upload is reported as not attempted.
    pub fn new(
        endpoint: Option<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint,
            token,
            timeout,
            client,
        })
    }

    /// Whether an endpoint is configured.
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Blocking upload for the synchronous session loop.
    pub fn upload(&self, artifact: &Path) -> UploadOutcome {
        match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(self.send(artifact)),
            Err(e) => UploadOutcome::Failed(UploadError::Transport(format!(
                "failed to start async runtime: {}",
                e
            ))),
        }
    }

    /// Upload `artifact` as a multipart `image` field.
    pub async fn send(&self, artifact: &Path) -> UploadOutcome {
        let Some(endpoint) = self.endpoint.as_deref() else {
            log::warn!(
                "Upload endpoint not configured; set API_UPLOAD_ENDPOINT or [upload] endpoint"
            );
            return UploadOutcome::NotAttempted {
                reason: "endpoint not configured".to_string(),
            };
        };

        if !artifact.exists() {
            return UploadOutcome::NotAttempted {
                reason: format!("artifact not found: {}", artifact.display()),
            };
        }

        let bytes = match tokio::fs::read(artifact).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return UploadOutcome::NotAttempted {
                    reason: format!("cannot read artifact: {}", e),
                }
            }
        };

        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photobooth.gif".to_string());

        let part = match Part::bytes(bytes).file_name(file_name).mime_str("image/gif") {
            Ok(part) => part,
            Err(e) => return UploadOutcome::Failed(UploadError::Transport(e.to_string())),
        };
        let form = Form::new().part("image", part);

        println!("Uploading GIF to {}...", endpoint);

        let mut request = self.client.post(endpoint).multipart(form);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return UploadOutcome::Failed(self.classify_request_error(e)),
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::OK || status == StatusCode::CREATED {
            let payload = serde_json::from_str(&body).unwrap_or_else(|_| {
                serde_json::json!({ "status": "success", "message": body })
            });
            UploadOutcome::Success(payload)
        } else {
            UploadOutcome::Failed(UploadError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn classify_request_error(&self, error: reqwest::Error) -> UploadError {
        if error.is_timeout() {
            UploadError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else if error.is_connect() {
            UploadError::Connection(error.to_string())
        } else {
            UploadError::Transport(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// ASCII stand-in for a GIF so multipart bodies stay matchable text.
    fn write_artifact(dir: &Path) -> PathBuf {
        let path = dir.join("photobooth_20260807_120000.gif");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"GIF89a fake artifact body").unwrap();
        path
    }

    fn uploader(endpoint: Option<String>, token: Option<String>) -> Uploader {
        Uploader::new(endpoint, token, DEFAULT_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn test_no_endpoint_makes_no_network_call() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());

        let outcome = uploader(None, None).send(&artifact).await;
        assert!(matches!(outcome, UploadOutcome::NotAttempted { .. }));
        // expect(0) is verified when mock_server drops.
    }

    #[tokio::test]
    async fn test_missing_file_is_not_attempted() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let outcome = uploader(Some(mock_server.uri()), None)
            .send(Path::new("/nonexistent/booth.gif"))
            .await;
        assert!(matches!(outcome, UploadOutcome::NotAttempted { .. }));
    }

    #[tokio::test]
    async fn test_success_201_returns_parsed_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/images"))
            .and(body_string_contains("name=\"image\""))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 42,
                "url": "https://gallery.example/images/42"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());

        let endpoint = format!("{}/api/images", mock_server.uri());
        let outcome = uploader(Some(endpoint), None).send(&artifact).await;

        assert_eq!(
            outcome,
            UploadOutcome::Success(serde_json::json!({
                "id": 42,
                "url": "https://gallery.example/images/42"
            }))
        );
    }

    #[tokio::test]
    async fn test_success_with_non_json_body_is_wrapped() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("uploaded"))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());

        let outcome = uploader(Some(mock_server.uri()), None).send(&artifact).await;
        assert_eq!(
            outcome,
            UploadOutcome::Success(serde_json::json!({
                "status": "success",
                "message": "uploaded"
            }))
        );
    }

    #[tokio::test]
    async fn test_bearer_token_header_is_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer booth-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());

        let outcome = uploader(Some(mock_server.uri()), Some("booth-token".to_string()))
            .send(&artifact)
            .await;
        assert!(matches!(outcome, UploadOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_filename_is_included_in_multipart() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("filename=\"photobooth_20260807_120000.gif\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());

        let outcome = uploader(Some(mock_server.uri()), None).send(&artifact).await;
        assert!(matches!(outcome, UploadOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_500_reports_status_and_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("storage full"))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());

        let outcome = uploader(Some(mock_server.uri()), None).send(&artifact).await;
        assert_eq!(
            outcome,
            UploadOutcome::Failed(UploadError::Status {
                status: 500,
                body: "storage full".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_timeout_is_distinguishable_from_status_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());

        let slow = Uploader::new(Some(mock_server.uri()), None, Duration::from_millis(50)).unwrap();
        let outcome = slow.send(&artifact).await;
        assert!(
            matches!(outcome, UploadOutcome::Failed(UploadError::Timeout { .. })),
            "expected timeout, got {:?}",
            outcome
        );
    }

    #[tokio::test]
    async fn test_connection_refused_reports_connection_error() {
        // Port 1 is essentially never listening.
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());

        let outcome = uploader(Some("http://127.0.0.1:1/api/images".to_string()), None)
            .send(&artifact)
            .await;
        assert!(
            matches!(outcome, UploadOutcome::Failed(UploadError::Connection(_))),
            "expected connection error, got {:?}",
            outcome
        );
    }
}
