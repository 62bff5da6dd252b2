//! Multipart HTTP uploader.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::config::UploadConfig;
use crate::error::{Result, TaskError};

use super::{FileUpload, Uploader};

/// Location of a stored file as reported by the upload service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Path or URL under which the file is served (e.g. `/file/abc123.png`)
    pub src: String,
}

/// Uploads files as `multipart/form-data` with a single `file` part
#[derive(Clone, Debug)]
pub struct HttpUploader {
    client: reqwest::Client,
    upload_url: url::Url,
}

impl HttpUploader {
    /// Build an uploader posting to `{endpoint}/upload`
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unusable endpoint, or a network error if
    /// the HTTP client cannot be constructed.
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let upload_url = config.upload_url()?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, upload_url })
    }

    /// URL files are posted to
    pub fn upload_url(&self) -> &url::Url {
        &self.upload_url
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, file: &FileUpload) -> std::result::Result<UploadedFile, TaskError> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str(&file.content_type)
            .map_err(|e| TaskError::terminal(format!("invalid content type: {}", e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TaskError::transient(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::debug!(filename = %file.filename, status = %status, "upload rejected");
            return Err(classify_status(status, &body));
        }

        parse_upload_response(&body)
    }
}

/// Transport-level failures are transient unless the request itself was malformed
fn classify_request_error(e: reqwest::Error) -> TaskError {
    if e.is_builder() {
        TaskError::terminal(format!("invalid upload request: {}", e))
    } else if e.is_timeout() {
        TaskError::transient(format!("upload timed out: {}", e))
    } else {
        TaskError::transient(format!("upload failed: {}", e))
    }
}

/// Map a non-success status to a task error, preferring the service's own message
fn classify_status(status: StatusCode, body: &str) -> TaskError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or_else(|| format!("upload failed with status {}", status));

    let retryable = status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS;
    if retryable {
        TaskError::Transient(message)
    } else {
        TaskError::Terminal(message)
    }
}

/// The service answers with either an array of stored files or a single object
fn parse_upload_response(body: &str) -> std::result::Result<UploadedFile, TaskError> {
    let invalid = || TaskError::transient("invalid response format");

    let value: serde_json::Value = serde_json::from_str(body).map_err(|_| invalid())?;
    let entry = match value {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };

    match serde_json::from_value::<UploadedFile>(entry) {
        Ok(uploaded) if !uploaded.src.is_empty() => Ok(uploaded),
        _ => Err(invalid()),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn uploader_for(server: &MockServer) -> HttpUploader {
        HttpUploader::new(&UploadConfig {
            endpoint: server.uri(),
            timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap()
    }

    fn png() -> FileUpload {
        FileUpload::new("cat.png", "image/png", b"\x89PNG fake".to_vec())
    }

    #[test]
    fn parses_array_and_object_responses() {
        assert_eq!(
            parse_upload_response(r#"[{"src":"/file/a.png"},{"src":"/file/b.png"}]"#).unwrap(),
            UploadedFile {
                src: "/file/a.png".to_string()
            }
        );
        assert_eq!(
            parse_upload_response(r#"{"src":"/file/c.png"}"#).unwrap().src,
            "/file/c.png"
        );
    }

    #[test]
    fn missing_or_empty_src_is_transient() {
        for body in [r#"[]"#, r#"{}"#, r#"[{"src":""}]"#, "<html>oops</html>"] {
            assert_eq!(
                parse_upload_response(body),
                Err(TaskError::transient("invalid response format")),
                "body: {body}"
            );
        }
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, r#"{"error":"File type not allowed"}"#),
            TaskError::terminal("File type not allowed")
        );
        assert_eq!(
            classify_status(StatusCode::PAYLOAD_TOO_LARGE, ""),
            TaskError::terminal("upload failed with status 413 Payload Too Large")
        );
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "busy"),
            TaskError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            TaskError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::REQUEST_TIMEOUT, ""),
            TaskError::Transient(_)
        ));
    }

    #[tokio::test]
    async fn posts_multipart_and_returns_src() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header_regex("content-type", "^multipart/form-data; boundary="))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "src": "/file/abc.png" }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let uploaded = uploader_for(&server).upload(&png()).await.unwrap();
        assert_eq!(uploaded.src, "/file/abc.png");
    }

    #[tokio::test]
    async fn client_error_uses_service_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({ "error": "File too large" })),
            )
            .mount(&server)
            .await;

        let err = uploader_for(&server).upload(&png()).await.unwrap_err();
        assert_eq!(err, TaskError::terminal("File too large"));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = uploader_for(&server).upload(&png()).await.unwrap_err();
        assert!(matches!(err, TaskError::Transient(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn slow_server_times_out_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(serde_json::json!({ "src": "/file/late.png" })),
            )
            .mount(&server)
            .await;

        let uploader = HttpUploader::new(&UploadConfig {
            endpoint: server.uri(),
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();

        let err = uploader.upload(&png()).await.unwrap_err();
        assert!(matches!(err, TaskError::Transient(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_content_type_is_terminal() {
        let server = MockServer::start().await;
        let bad = FileUpload::new("x.bin", "not a mime type", vec![1, 2, 3]);
        let err = uploader_for(&server).upload(&bad).await.unwrap_err();
        assert!(matches!(err, TaskError::Terminal(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn endpoint_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "src": "/file/p.png" })))
            .expect(1)
            .mount(&server)
            .await;

        let uploader = HttpUploader::new(&UploadConfig {
            endpoint: format!("{}/api", server.uri()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(uploader.upload(&png()).await.unwrap().src, "/file/p.png");
    }

    #[test]
    fn upload_url_is_derived_from_endpoint() {
        let uploader = HttpUploader::new(&UploadConfig {
            endpoint: "http://localhost:8787/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(uploader.upload_url().as_str(), "http://localhost:8787/upload");
    }
}
