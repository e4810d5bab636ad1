//! Media hand-off to an n8n "wait for webhook" node.
//!
//! A [`MediaJob`] downloads one reel, base64-encodes the video and its
//! caption into a [`WebhookPayload`] and POSTs it to the workflow's resume
//! URL. Failures are reported to the workflow as an `"error"` payload so the
//! paused execution can continue.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::pipeline::{DescriptionSource, MediaFetcher};
use crate::reel;
use crate::retry::{api_error, RetryPolicy};

const SERVICE: &str = "webhook";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub status: String,
    pub message: String,
    /// Standard base64 of the video bytes; empty on error.
    pub media: String,
    /// Standard base64 of the UTF-8 caption; empty on error.
    pub description: String,
}

impl WebhookPayload {
    pub fn success(message: impl Into<String>, media: &[u8], description: &str) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: message.into(),
            media: STANDARD.encode(media),
            description: STANDARD.encode(description.as_bytes()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: message.into(),
            media: String::new(),
            description: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    pub fn media_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.media.as_bytes())
            .map_err(|e| PipelineError::InvalidPayload(format!("media: {e}")))
    }

    pub fn description_text(&self) -> Result<String> {
        let bytes = STANDARD
            .decode(self.description.as_bytes())
            .map_err(|e| PipelineError::InvalidPayload(format!("description: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| PipelineError::InvalidPayload(format!("description is not UTF-8: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

// ---------------------------------------------------------------------------
// MediaJob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaJob {
    pub url: String,
    pub account_type: String,
    pub resume_url: String,
}

impl MediaJob {
    pub fn validate(&self) -> Result<()> {
        if reel::extract_reel_id(&self.url).is_none() {
            return Err(PipelineError::InvalidPayload(format!(
                "'{}' is not a reel URL",
                self.url
            )));
        }
        if !(self.resume_url.starts_with("http://") || self.resume_url.starts_with("https://")) {
            return Err(PipelineError::InvalidPayload(format!(
                "resume URL '{}' must be http(s)",
                self.resume_url
            )));
        }
        Ok(())
    }

    /// Download the reel into `work_dir` and build the payload. Download
    /// and read failures become an error payload.
    pub fn build_payload<M, D>(&self, media: &M, descriptions: &D, work_dir: &Path) -> WebhookPayload
    where
        M: MediaFetcher + ?Sized,
        D: DescriptionSource + ?Sized,
    {
        let reel_id = reel::extract_reel_id(&self.url).unwrap_or_else(|| "reel".to_string());
        let path = match media.fetch(&self.url, &reel_id, work_dir) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("download of {} failed: {e}", self.url);
                return WebhookPayload::failure(format!("download failed: {e}"));
            }
        };
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => return WebhookPayload::failure(format!("reading {}: {e}", path.display())),
        };
        let description = descriptions.description(&self.url).unwrap_or_else(|e| {
            tracing::warn!("no description for {reel_id}: {e}");
            String::new()
        });
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::debug!("leaving {}: {e}", path.display());
        }
        WebhookPayload::success(
            format!("downloaded {reel_id} for {} account ({} bytes)", self.account_type, bytes.len()),
            &bytes,
            &description,
        )
    }

    /// Build the payload and deliver it to `resume_url`. Returns the payload
    /// that was sent.
    pub fn run<M, D>(&self, media: &M, descriptions: &D, client: &WebhookClient) -> Result<WebhookPayload>
    where
        M: MediaFetcher + ?Sized,
        D: DescriptionSource + ?Sized,
    {
        self.validate()?;
        let work = tempfile::TempDir::new()?;
        let payload = self.build_payload(media, descriptions, work.path());
        client.post(&self.resume_url, &payload)?;
        Ok(payload)
    }
}

// ---------------------------------------------------------------------------
// WebhookClient
// ---------------------------------------------------------------------------

pub struct WebhookClient {
    http: Client,
    retry: RetryPolicy,
}

impl WebhookClient {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| transport(&e))?;
        Ok(Self { http, retry })
    }

    pub fn post(&self, url: &str, payload: &WebhookPayload) -> Result<()> {
        self.retry.run("webhook delivery", |_| {
            let resp = self
                .http
                .post(url)
                .json(payload)
                .send()
                .map_err(|e| transport(&e))?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().unwrap_or_default();
                return Err(api_error(SERVICE, status.as_u16(), &body));
            }
            Ok(())
        })?;
        tracing::info!("delivered '{}' payload to {url}", payload.status);
        Ok(())
    }
}

fn transport(e: &reqwest::Error) -> PipelineError {
    PipelineError::Transport {
        service: SERVICE,
        message: e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::path::PathBuf;

    struct FakeTool {
        fail_download: bool,
    }

    impl MediaFetcher for FakeTool {
        fn fetch(&self, _url: &str, reel_id: &str, dir: &Path) -> Result<PathBuf> {
            if self.fail_download {
                return Err(PipelineError::Tool("exit 1: private video".into()));
            }
            let p = dir.join(format!("{reel_id}_1.mp4"));
            std::fs::write(&p, [0u8, 159, 146, 150, 255])?;
            Ok(p)
        }
    }

    impl DescriptionSource for FakeTool {
        fn description(&self, _url: &str) -> Result<String> {
            Ok("Läuft 🎬 #motivation".to_string())
        }
    }

    fn job(resume: &str) -> MediaJob {
        MediaJob {
            url: "https://www.instagram.com/reel/C8xyz/".into(),
            account_type: "motivation".into(),
            resume_url: resume.into(),
        }
    }

    #[test]
    fn base64_fields_round_trip() {
        let media = vec![0u8, 1, 2, 254, 255, 10, 13];
        let p = WebhookPayload::success("ok", &media, "multi\nline ✓");
        let back = WebhookPayload::from_json(&p.to_json().unwrap()).unwrap();
        assert_eq!(back, p);
        assert_eq!(back.media_bytes().unwrap(), media);
        assert_eq!(back.description_text().unwrap(), "multi\nline ✓");
    }

    #[test]
    fn json_shape_matches_workflow_contract() {
        let p = WebhookPayload::success("m", b"ab", "c");
        let v: serde_json::Value = serde_json::from_str(&p.to_json().unwrap()).unwrap();
        assert_eq!(
            v,
            json!({"status": "success", "message": "m", "media": "YWI=", "description": "Yw=="})
        );
    }

    #[test]
    fn bad_base64_is_invalid_payload() {
        let mut p = WebhookPayload::failure("x");
        p.media = "not base64!!".into();
        assert!(matches!(p.media_bytes(), Err(PipelineError::InvalidPayload(_))));
        assert!(!p.is_success());
    }

    #[test]
    fn job_validation() {
        assert!(job("https://n8n.example/webhook-waiting/1").validate().is_ok());
        assert!(job("ftp://x").validate().is_err());
        let mut j = job("https://x");
        j.url = "https://www.instagram.com/someone/".into();
        assert!(j.validate().is_err());
    }

    #[test]
    fn build_payload_success_and_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let j = job("https://x");
        let ok = j.build_payload(&FakeTool { fail_download: false }, &FakeTool { fail_download: false }, dir.path());
        assert!(ok.is_success());
        assert_eq!(ok.media_bytes().unwrap(), vec![0u8, 159, 146, 150, 255]);
        assert_eq!(ok.description_text().unwrap(), "Läuft 🎬 #motivation");
        assert!(ok.message.contains("motivation"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let bad = j.build_payload(&FakeTool { fail_download: true }, &FakeTool { fail_download: true }, dir.path());
        assert_eq!(bad.status, STATUS_ERROR);
        assert!(bad.message.contains("private video"));
        assert!(bad.media.is_empty());
    }

    #[test]
    fn run_posts_payload_to_resume_url() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("POST", "/webhook-waiting/42")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({"status": "success"})))
            .with_status(200)
            .create();
        let client = WebhookClient::new(Duration::from_secs(5), RetryPolicy::none()).unwrap();
        let tool = FakeTool { fail_download: false };
        let sent = job(&format!("{}/webhook-waiting/42", server.url()))
            .run(&tool, &tool, &client)
            .unwrap();
        assert!(sent.is_success());
        m.assert();
    }

    #[test]
    fn delivery_failure_is_reported() {
        let mut server = mockito::Server::new();
        server.mock("POST", "/hook").with_status(404).create();
        let client = WebhookClient::new(Duration::from_secs(5), RetryPolicy::none()).unwrap();
        let err = client
            .post(&format!("{}/hook", server.url()), &WebhookPayload::failure("x"))
            .unwrap_err();
        assert_eq!(err.api_kind(), Some(crate::retry::ApiErrorKind::NotFound));
    }
}
