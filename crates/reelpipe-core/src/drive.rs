//! Google Drive v3 resumable uploads.

use reqwest::blocking::Client;
use reqwest::header::LOCATION;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenSource;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::retry::{api_error, RetryPolicy};

const SERVICE: &str = "drive";
const VIDEO_MIME: &str = "video/mp4";

pub struct DriveClient {
    http: Client,
    api_base: String,
    folder_id: Option<String>,
    tokens: Arc<TokenSource>,
    retry: RetryPolicy,
}

impl DriveClient {
    pub fn new(cfg: &Config, tokens: Arc<TokenSource>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| transport(&e))?;
        Ok(Self {
            http,
            api_base: cfg.drive.api_base.trim_end_matches('/').to_string(),
            folder_id: cfg.drive.folder_id.clone().filter(|f| !f.trim().is_empty()),
            tokens,
            retry: cfg.retry.policy(),
        })
    }

    /// Upload `path` under its file name. Returns the Drive file id.
    pub fn upload_file(&self, path: &Path) -> Result<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::Tool(format!("not a file: {}", path.display())))?
            .to_string();
        let bytes = std::fs::read(path)?;
        let id = self.retry.run(&format!("upload {name}"), |_| {
            let session = self.start_session(&name, bytes.len())?;
            self.send_bytes(&session, &bytes)
        })?;
        tracing::info!("uploaded {name} to Drive as {id}");
        Ok(id)
    }

    fn start_session(&self, name: &str, len: usize) -> Result<String> {
        let mut metadata = json!({ "name": name, "mimeType": VIDEO_MIME });
        if let Some(folder) = &self.folder_id {
            metadata["parents"] = json!([folder]);
        }
        let url = format!("{}/upload/drive/v3/files?uploadType=resumable", self.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.tokens.token()?)
            .header("X-Upload-Content-Type", VIDEO_MIME)
            .header("X-Upload-Content-Length", len.to_string())
            .json(&metadata)
            .send()
            .map_err(|e| transport(&e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(api_error(SERVICE, status.as_u16(), &body));
        }
        resp.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| api_error(SERVICE, status.as_u16(), "resumable session without Location header"))
    }

    fn send_bytes(&self, session: &str, bytes: &[u8]) -> Result<String> {
        let resp = self
            .http
            .put(session)
            .bearer_auth(self.tokens.token()?)
            .header(reqwest::header::CONTENT_TYPE, VIDEO_MIME)
            .body(bytes.to_vec())
            .send()
            .map_err(|e| transport(&e))?;
        let status = resp.status();
        let body = resp.text().map_err(|e| transport(&e))?;
        if !status.is_success() {
            return Err(api_error(SERVICE, status.as_u16(), &body));
        }
        let file: Value = serde_json::from_str(&body)?;
        file["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| api_error(SERVICE, status.as_u16(), "upload response has no file id"))
    }
}

fn transport(e: &reqwest::Error) -> PipelineError {
    PipelineError::Transport {
        service: SERVICE,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::ApiErrorKind;
    use mockito::Matcher;
    use tempfile::TempDir;

    fn client(server: &mockito::Server, folder: Option<&str>, attempts: u32) -> DriveClient {
        let mut cfg = Config::template();
        cfg.drive.api_base = server.url();
        cfg.drive.folder_id = folder.map(str::to_string);
        cfg.retry.max_attempts = attempts;
        cfg.retry.base_delay_ms = 0;
        cfg.retry.max_delay_ms = 0;
        DriveClient::new(&cfg, Arc::new(TokenSource::Static("tok".into()))).unwrap()
    }

    fn video(dir: &TempDir) -> std::path::PathBuf {
        let p = dir.path().join("ABC_1700000000000.mp4");
        std::fs::write(&p, b"fake mp4 bytes").unwrap();
        p
    }

    #[test]
    fn resumable_upload_returns_file_id() {
        let mut server = mockito::Server::new();
        let session = format!("{}/upload/session/xyz", server.url());
        let start = server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::UrlEncoded("uploadType".into(), "resumable".into()))
            .match_header("authorization", "Bearer tok")
            .match_header("x-upload-content-length", "14")
            .match_body(Matcher::PartialJson(json!({
                "name": "ABC_1700000000000.mp4",
                "parents": ["folder-1"],
            })))
            .with_status(200)
            .with_header("location", &session)
            .create();
        let put = server
            .mock("PUT", "/upload/session/xyz")
            .match_body("fake mp4 bytes")
            .with_status(200)
            .with_body(r#"{"id":"drive-file-9","name":"ABC_1700000000000.mp4"}"#)
            .create();

        let dir = TempDir::new().unwrap();
        let id = client(&server, Some("folder-1"), 1)
            .upload_file(&video(&dir))
            .unwrap();
        assert_eq!(id, "drive-file-9");
        start.assert();
        put.assert();
    }

    #[test]
    fn no_folder_means_no_parents() {
        let mut server = mockito::Server::new();
        let session = format!("{}/s", server.url());
        server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({
                "name": "ABC_1700000000000.mp4",
                "mimeType": "video/mp4",
            })))
            .with_status(200)
            .with_header("location", &session)
            .create();
        server
            .mock("PUT", "/s")
            .with_status(200)
            .with_body(r#"{"id":"f"}"#)
            .create();
        let dir = TempDir::new().unwrap();
        let c = client(&server, None, 1);
        assert!(c.folder_id.is_none());
        assert_eq!(c.upload_file(&video(&dir)).unwrap(), "f");
    }

    #[test]
    fn quota_errors_are_retried() {
        let mut server = mockito::Server::new();
        let start = server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("User rate limit exceeded")
            .expect(3)
            .create();
        let dir = TempDir::new().unwrap();
        let err = client(&server, None, 3).upload_file(&video(&dir)).unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Quota));
        start.assert();
    }

    #[test]
    fn permission_errors_are_not_retried() {
        let mut server = mockito::Server::new();
        let start = server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("The user does not have sufficient permissions for this file.")
            .expect(1)
            .create();
        let dir = TempDir::new().unwrap();
        let err = client(&server, Some("f"), 3).upload_file(&video(&dir)).unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Permission));
        start.assert();
    }

    #[test]
    fn missing_file_is_io_error() {
        let server = mockito::Server::new();
        let err = client(&server, None, 1)
            .upload_file(Path::new("/nonexistent/x.mp4"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
