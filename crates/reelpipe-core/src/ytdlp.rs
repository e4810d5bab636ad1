//! yt-dlp invocation: descriptions, metadata and mp4 downloads.
//!
//! Every call runs the binary with piped output and a deadline. When the
//! deadline passes the child is killed and [`PipelineError::Timeout`] is
//! returned.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::paths;
use crate::reel::single_line;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const METADATA_TIMEOUT: Duration = Duration::from_secs(60);

/// Locate `yt-dlp` on PATH.
pub fn detect() -> Result<PathBuf> {
    which::which("yt-dlp").map_err(|_| PipelineError::YtDlpMissing)
}

pub fn ffmpeg_available() -> bool {
    which::which("ffmpeg").is_ok()
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    cookies: Option<PathBuf>,
    description_timeout: Duration,
    download_timeout: Duration,
    retries: u32,
}

impl YtDlp {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            cookies: None,
            description_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(120),
            retries: 0,
        }
    }

    /// Detected binary configured from `processing` and `download`. The
    /// cookie jar is only passed when the file exists.
    pub fn from_config(root: &Path, cfg: &Config) -> Result<Self> {
        let cookies = paths::resolve(root, &cfg.processing.cookies_file);
        let mut tool = Self::new(detect()?)
            .with_timeouts(
                Duration::from_secs(cfg.processing.description_timeout_secs),
                Duration::from_secs(cfg.download.timeout_secs),
            )
            .with_retries(cfg.download.retries);
        if cookies.is_file() {
            tool = tool.with_cookies(cookies);
        } else {
            tracing::debug!("no cookie jar at {}", cookies.display());
        }
        Ok(tool)
    }

    pub fn with_cookies(mut self, path: PathBuf) -> Self {
        self.cookies = Some(path);
        self
    }

    pub fn with_timeouts(mut self, description: Duration, download: Duration) -> Self {
        self.description_timeout = description;
        self.download_timeout = download;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Caption text of a reel, collapsed onto one line. Empty when the reel
    /// has none.
    pub fn description(&self, url: &str) -> Result<String> {
        let mut args = vec!["--get-description".to_string(), "--no-warnings".to_string()];
        self.push_cookies(&mut args);
        args.push(url.to_string());
        let out = self.run(&args, self.description_timeout)?;
        Ok(single_line(&out))
    }

    pub fn metadata(&self, url: &str) -> Result<serde_json::Value> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-warnings".to_string(),
            "--skip-download".to_string(),
        ];
        self.push_cookies(&mut args);
        args.push(url.to_string());
        let out = self.run(&args, METADATA_TIMEOUT)?;
        Ok(serde_json::from_str(out.trim())?)
    }

    /// Download `url` as `<dir>/<reel_id>_<millis>.mp4`, retrying failed
    /// attempts. Returns the produced file.
    pub fn download(&self, url: &str, reel_id: &str, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.download_once(url, reel_id, dir) {
                Ok(path) => return Ok(path),
                Err(e) if attempt <= self.retries => {
                    tracing::warn!("download of {reel_id} failed (attempt {attempt}): {e}");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn download_once(&self, url: &str, reel_id: &str, dir: &Path) -> Result<PathBuf> {
        let stem = format!("{reel_id}_{}", chrono::Utc::now().timestamp_millis());
        let template = dir.join(format!("{stem}.%(ext)s"));
        let mut args = vec![
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            "--format".to_string(),
            "best[ext=mp4]/best".to_string(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "--no-playlist".to_string(),
            "--add-metadata".to_string(),
            "--no-warnings".to_string(),
        ];
        self.push_cookies(&mut args);
        args.push(url.to_string());
        self.run(&args, self.download_timeout)?;

        find_output(dir, &stem)?.ok_or_else(|| {
            PipelineError::Tool(format!("download of {url} finished but no file named {stem}.* was produced"))
        })
    }

    fn push_cookies(&self, args: &mut Vec<String>) {
        if let Some(c) = &self.cookies {
            args.push("--cookies".to_string());
            args.push(c.to_string_lossy().into_owned());
        }
    }

    fn run(&self, args: &[String], timeout: Duration) -> Result<String> {
        tracing::debug!("yt-dlp {}", args.join(" "));
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::Tool(format!("failed to start {}: {e}", self.program.display())))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        // Readers are left detached on timeout; grandchildren may still
        // hold the pipes open.
        let Some(status) = wait_with_deadline(&mut child, timeout)? else {
            return Err(PipelineError::Timeout {
                tool: "yt-dlp".into(),
                secs: timeout.as_secs(),
            });
        };
        let out = stdout.join().unwrap_or_default();
        let err = stderr.join().unwrap_or_default();
        if !status.success() {
            let msg = err.trim();
            let msg = if msg.is_empty() { out.trim() } else { msg };
            return Err(PipelineError::Tool(format!(
                "exit {}: {}",
                status.code().unwrap_or(-1),
                msg.chars().take(500).collect::<String>()
            )));
        }
        Ok(out)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut p) = pipe {
            let mut bytes = Vec::new();
            if p.read_to_end(&mut bytes).is_ok() {
                buf = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        buf
    })
}

/// `None` when the deadline passed and the child was killed.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            tracing::warn!("yt-dlp exceeded {}s, killing", timeout.as_secs());
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// First file in `dir` named `<stem>.*`, preferring `.mp4`.
fn find_output(dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
    let prefix = format!("{stem}.");
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && !n.ends_with(".part"))
        })
        .collect();
    found.sort_by_key(|p| p.extension().and_then(|e| e.to_str()) != Some("mp4"));
    Ok(found.into_iter().next())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
