//! Browser control for the scraper.
//!
//! [`WebDriverBrowser`] speaks the W3C WebDriver HTTP protocol to a running
//! chromedriver (`chromedriver --port=9515`). All page interaction goes
//! through small injected scripts.

use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::BrowserConfig;
use crate::error::{PipelineError, Result};

/// A reel anchor on a profile grid with the posting time shown next to it,
/// if any (`datetime` attribute or relative text such as "3d").
#[derive(Debug, Clone, PartialEq)]
pub struct ReelTile {
    pub href: String,
    pub time: Option<String>,
}

pub trait Browser {
    fn open(&mut self, url: &str) -> Result<()>;
    fn scroll_height(&mut self) -> Result<i64>;
    fn scroll_to(&mut self, y: i64) -> Result<()>;
    fn scroll_to_bottom(&mut self) -> Result<()>;
    /// Resolved `href` of every element matching `css`.
    fn hrefs(&mut self, css: &str) -> Result<Vec<String>>;
    fn inject_css(&mut self, css: &str) -> Result<()>;
    fn reel_tiles(&mut self) -> Result<Vec<ReelTile>> {
        Ok(self
            .hrefs(REEL_ANCHORS)?
            .into_iter()
            .map(|href| ReelTile { href, time: None })
            .collect())
    }
    /// Click away login / notification / cookie dialogs. Returns how many
    /// were dismissed.
    fn dismiss_popups(&mut self) -> Result<usize>;
    fn close(&mut self) -> Result<()>;
}

/// Chrome command-line switches for a scraping session.
pub fn chrome_args(cfg: &BrowserConfig, fast: bool) -> Vec<String> {
    let mut args: Vec<String> = [
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--disable-blink-features=AutomationControlled",
        "--disable-notifications",
        "--disable-extensions",
        "--disable-gpu",
        "--no-first-run",
        "--no-default-browser-check",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if fast {
        args.extend(
            [
                "--disable-background-timer-throttling",
                "--disable-backgrounding-occluded-windows",
                "--disable-renderer-backgrounding",
                "--blink-settings=imagesEnabled=false",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }
    if cfg.headless {
        args.push("--headless=new".to_string());
    }
    if let Some(dir) = &cfg.profile_dir {
        args.push(format!("--user-data-dir={dir}"));
    }
    args.push(format!("--user-agent={}", cfg.user_agent));
    args
}

pub const REEL_ANCHORS: &str = "a[href*='/reel/']";

const TILES_SCRIPT: &str = r#"
return Array.from(document.querySelectorAll(arguments[0])).map(a => {
  const box = a.closest("article") || a.parentElement;
  const t = box ? box.querySelector("time") : null;
  return { href: a.href || "", time: t ? (t.getAttribute("datetime") || t.innerText || null) : null };
});
"#;

const POPUP_SCRIPT: &str = r#"
const labels = ["not now", "allow all cookies", "allow essential and optional cookies", "decline optional cookies"];
let n = 0;
for (const b of document.querySelectorAll("button, div[role=button]")) {
  const t = (b.innerText || "").trim().toLowerCase();
  if (labels.includes(t)) { b.click(); n++; }
}
return n;
"#;

const FAST_CSS: &str = "*{animation-duration:0.001s!important;transition-duration:0.001s!important;animation-delay:0s!important;transition-delay:0s!important}img,video{display:none!important}";

/// CSS injected in fast mode to stop animations and media rendering.
pub fn fast_mode_css() -> &'static str {
    FAST_CSS
}

// ---------------------------------------------------------------------------
// WebDriverBrowser
// ---------------------------------------------------------------------------

pub struct WebDriverBrowser {
    http: Client,
    endpoint: String,
    session_id: Option<String>,
}

impl WebDriverBrowser {
    /// Start a new chromedriver session.
    pub fn start(cfg: &BrowserConfig, fast: bool) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.page_load_timeout_secs + 30))
            .build()
            .map_err(|e| PipelineError::Browser(e.to_string()))?;
        let endpoint = cfg.webdriver_url.trim_end_matches('/').to_string();
        let mut browser = Self {
            http,
            endpoint,
            session_id: None,
        };

        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": chrome_args(cfg, fast) },
                    "timeouts": {
                        "pageLoad": cfg.page_load_timeout_secs * 1000,
                        "implicit": cfg.implicit_wait_secs * 1000,
                    }
                }
            }
        });
        let value = browser.call("POST", "/session", Some(caps))?;
        let id = value["sessionId"]
            .as_str()
            .ok_or_else(|| PipelineError::Browser("webdriver returned no sessionId".into()))?
            .to_string();
        tracing::info!("browser session {id} started");
        browser.session_id = Some(id);
        Ok(browser)
    }

    fn session_path(&self, suffix: &str) -> Result<String> {
        let id = self
            .session_id
            .as_deref()
            .ok_or_else(|| PipelineError::Browser("no active session".into()))?;
        Ok(format!("/session/{id}{suffix}"))
    }

    fn call(&self, method: &str, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.endpoint, path);
        let req = match method {
            "GET" => self.http.get(&url),
            "DELETE" => self.http.delete(&url),
            _ => self.http.post(&url),
        };
        let req = match body {
            Some(b) => req.json(&b),
            None => req,
        };
        let resp = req
            .send()
            .map_err(|e| PipelineError::Browser(format!("{method} {path}: {e}")))?;
        let status = resp.status();
        let payload: Value = resp
            .json()
            .map_err(|e| PipelineError::Browser(format!("{method} {path}: bad response: {e}")))?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        if !status.is_success() || value.get("error").is_some() {
            let error = value["error"].as_str().unwrap_or("unknown error");
            let message = value["message"].as_str().unwrap_or_default();
            return Err(PipelineError::Browser(format!("{error}: {message}")));
        }
        Ok(value)
    }

    fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        let path = self.session_path("/execute/sync")?;
        self.call("POST", &path, Some(json!({ "script": script, "args": args })))
    }
}

impl Browser for WebDriverBrowser {
    fn open(&mut self, url: &str) -> Result<()> {
        let path = self.session_path("/url")?;
        self.call("POST", &path, Some(json!({ "url": url })))?;
        Ok(())
    }

    fn scroll_height(&mut self) -> Result<i64> {
        let v = self.execute("return document.body.scrollHeight;", vec![])?;
        Ok(v.as_f64().map(|h| h as i64).unwrap_or(0))
    }

    fn scroll_to(&mut self, y: i64) -> Result<()> {
        self.execute("window.scrollTo(0, arguments[0]);", vec![json!(y)])?;
        Ok(())
    }

    fn scroll_to_bottom(&mut self) -> Result<()> {
        self.execute("window.scrollTo(0, document.body.scrollHeight);", vec![])?;
        Ok(())
    }

    fn hrefs(&mut self, css: &str) -> Result<Vec<String>> {
        let v = self.execute(
            "return Array.from(document.querySelectorAll(arguments[0])).map(e => e.href || e.getAttribute('href') || '');",
            vec![json!(css)],
        )?;
        Ok(v.as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn inject_css(&mut self, css: &str) -> Result<()> {
        self.execute(
            "const s = document.createElement('style'); s.textContent = arguments[0]; document.head.appendChild(s);",
            vec![json!(css)],
        )?;
        Ok(())
    }

    fn reel_tiles(&mut self) -> Result<Vec<ReelTile>> {
        let v = self.execute(TILES_SCRIPT, vec![json!(REEL_ANCHORS)])?;
        let tiles = v
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| {
                        let href = i["href"].as_str().filter(|h| !h.is_empty())?;
                        Some(ReelTile {
                            href: href.to_string(),
                            time: i["time"]
                                .as_str()
                                .map(str::trim)
                                .filter(|t| !t.is_empty())
                                .map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(tiles)
    }

    fn dismiss_popups(&mut self) -> Result<usize> {
        let v = self.execute(POPUP_SCRIPT, vec![])?;
        Ok(v.as_u64().unwrap_or(0) as usize)
    }

    fn close(&mut self) -> Result<()> {
        if self.session_id.is_none() {
            return Ok(());
        }
        let path = self.session_path("")?;
        self.session_id = None;
        self.call("DELETE", &path, None)?;
        tracing::debug!("browser session closed");
        Ok(())
    }
}

impl Drop for WebDriverBrowser {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("closing browser session on drop: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn cfg(server: &mockito::Server) -> BrowserConfig {
        BrowserConfig {
            webdriver_url: server.url(),
            headless: true,
            profile_dir: Some("/tmp/ig-profile".into()),
            ..BrowserConfig::default()
        }
    }

    #[test]
    fn chrome_args_follow_config() {
        let c = BrowserConfig {
            headless: true,
            profile_dir: Some("/p".into()),
            ..BrowserConfig::default()
        };
        let args = chrome_args(&c, true);
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--user-data-dir=/p".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-agent=Mozilla")));
        assert!(args.iter().any(|a| a.contains("imagesEnabled=false")));

        let slow = chrome_args(&BrowserConfig::default(), false);
        assert!(!slow.iter().any(|a| a.starts_with("--headless")));
        assert!(!slow.iter().any(|a| a.contains("imagesEnabled")));
    }

    #[test]
    fn session_lifecycle() {
        let mut server = mockito::Server::new();
        let new_session = server
            .mock("POST", "/session")
            .match_body(Matcher::Regex("--headless=new".into()))
            .with_status(200)
            .with_body(r#"{"value":{"sessionId":"s1","capabilities":{}}}"#)
            .create();
        let nav = server
            .mock("POST", "/session/s1/url")
            .match_body(Matcher::PartialJson(json!({"url": "https://www.instagram.com/a/reels/"})))
            .with_status(200)
            .with_body(r#"{"value":null}"#)
            .create();
        let exec = server
            .mock("POST", "/session/s1/execute/sync")
            .with_status(200)
            .with_body(r#"{"value":["https://www.instagram.com/reel/A/","", null]}"#)
            .create();
        let delete = server
            .mock("DELETE", "/session/s1")
            .with_status(200)
            .with_body(r#"{"value":null}"#)
            .expect(1)
            .create();

        let mut b = WebDriverBrowser::start(&cfg(&server), true).unwrap();
        b.open("https://www.instagram.com/a/reels/").unwrap();
        let hrefs = b.hrefs("a[href*='/reel/']").unwrap();
        assert_eq!(hrefs, vec!["https://www.instagram.com/reel/A/".to_string()]);
        b.close().unwrap();
        drop(b);

        new_session.assert();
        nav.assert();
        exec.assert();
        delete.assert();
    }

    #[test]
    fn reel_tiles_carry_time_text() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/session")
            .with_status(200)
            .with_body(r#"{"value":{"sessionId":"s2"}}"#)
            .create();
        server
            .mock("POST", "/session/s2/execute/sync")
            .with_status(200)
            .with_body(
                r#"{"value":[{"href":"https://www.instagram.com/reel/A/","time":"2025-06-01T10:00:00.000Z"},{"href":"https://www.instagram.com/reel/B/","time":null},{"href":"","time":"1d"}]}"#,
            )
            .create();
        server
            .mock("DELETE", "/session/s2")
            .with_status(200)
            .with_body(r#"{"value":null}"#)
            .create();

        let mut b = WebDriverBrowser::start(&cfg(&server), false).unwrap();
        let tiles = b.reel_tiles().unwrap();
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].time.as_deref(), Some("2025-06-01T10:00:00.000Z"));
        assert_eq!(tiles[1].time, None);
    }

    #[test]
    fn webdriver_errors_surface_as_browser_errors() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/session")
            .with_status(500)
            .with_body(r#"{"value":{"error":"session not created","message":"Chrome failed to start"}}"#)
            .create();
        let err = WebDriverBrowser::start(&cfg(&server), false).err().unwrap();
        assert!(matches!(&err, PipelineError::Browser(m) if m.contains("session not created")));
        assert!(err.hint().is_some());
    }
}
