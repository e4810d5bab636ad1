use crate::output::print_json;
use crate::project::Project;
use anyhow::Context;
use reelpipe_core::config::Config;
use reelpipe_core::webhook::{MediaJob, WebhookClient, WebhookPayload};
use reelpipe_core::ytdlp::YtDlp;
use reelpipe_core::PipelineError;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

#[derive(Serialize)]
struct NotifyOutput<'a> {
    status: &'a str,
    message: &'a str,
    resume_url: &'a str,
}

/// Media job for one reel. Needs no sheet, so a missing config file falls
/// back to defaults.
pub fn run(
    root: &Path,
    config_path: &Path,
    url: String,
    account_type: String,
    resume_url: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let project = match Project::load(root, config_path) {
        Ok(p) => p,
        Err(e) if is_not_initialized(&e) => {
            tracing::debug!("no config at {}, using defaults", config_path.display());
            let mut config = Config::default();
            config.apply_env_overrides(|k| std::env::var(k).ok());
            Project {
                root: root.to_path_buf(),
                config_path: config_path.to_path_buf(),
                config,
            }
        }
        Err(e) => return Err(e),
    };

    let resume_url = resume_url
        .or_else(|| project.config.webhook.url.clone())
        .ok_or_else(|| PipelineError::MissingConfig("webhook.url".into()))
        .context("no --resume-url given")?;
    let job = MediaJob {
        url,
        account_type,
        resume_url,
    };
    job.validate()?;

    let tool: YtDlp = project.ytdlp()?;
    let client = WebhookClient::new(
        Duration::from_secs(project.config.webhook.timeout_secs),
        project.config.retry.policy(),
    )?;
    let payload = job
        .run(&tool, &tool, &client)
        .with_context(|| format!("delivering {} to {}", job.url, job.resume_url))?;

    report(&payload, &job.resume_url, json)
}

/// Print what was delivered. An error payload still reached the webhook,
/// but the command fails so callers see it.
fn report(payload: &WebhookPayload, resume_url: &str, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(&NotifyOutput {
            status: &payload.status,
            message: &payload.message,
            resume_url,
        })?;
    } else {
        println!("{}: {}", payload.status, payload.message);
    }
    if !payload.is_success() {
        anyhow::bail!("media job failed ({resume_url} notified): {}", payload.message);
    }
    Ok(())
}

fn is_not_initialized(e: &anyhow::Error) -> bool {
    e.chain()
        .any(|c| matches!(c.downcast_ref::<PipelineError>(), Some(PipelineError::NotInitialized)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivered_failure_is_an_error() {
        let payload = WebhookPayload::failure("yt-dlp exited with status 1");
        let err = report(&payload, "http://localhost:5678/webhook-waiting/1", true).unwrap_err();
        assert!(err.to_string().contains("yt-dlp exited with status 1"));
    }

    #[test]
    fn delivered_success_is_ok() {
        let payload = WebhookPayload::success("downloaded", b"mp4", "caption");
        assert!(report(&payload, "http://localhost:5678/webhook-waiting/1", false).is_ok());
    }
}
