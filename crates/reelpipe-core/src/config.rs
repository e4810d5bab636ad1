use crate::error::{PipelineError, Result};
use crate::paths;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SourcesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Profile URLs to scrape, e.g. `https://www.instagram.com/someone/`.
    #[serde(default)]
    pub instagram_urls: Vec<String>,
}

// ---------------------------------------------------------------------------
// GoogleConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Environment variable holding an OAuth access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Shell command printing an access token, e.g.
    /// `gcloud auth print-access-token`. Takes precedence over `token_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_command: Option<String>,
}

fn default_token_env() -> String {
    "GOOGLE_OAUTH_ACCESS_TOKEN".to_string()
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            token_command: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SheetsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default = "default_worksheet")]
    pub worksheet: String,
    #[serde(default = "default_sheets_api")]
    pub api_base: String,
    /// Minimum spacing between write calls.
    #[serde(default = "default_write_interval")]
    pub write_interval_ms: u64,
    /// Install the status dropdown and colours when headers are written.
    #[serde(default = "default_true")]
    pub setup_formatting: bool,
}

fn default_worksheet() -> String {
    "Sheet1".to_string()
}

fn default_sheets_api() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

fn default_write_interval() -> u64 {
    1100
}

fn default_true() -> bool {
    true
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            worksheet: default_worksheet(),
            api_base: default_sheets_api(),
            write_interval_ms: default_write_interval(),
            setup_formatting: true,
        }
    }
}

// ---------------------------------------------------------------------------
// DriveConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Target folder; uploads land in the Drive root when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default = "default_google_api")]
    pub api_base: String,
}

fn default_google_api() -> String {
    "https://www.googleapis.com".to_string()
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            folder_id: None,
            api_base: default_google_api(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScrapingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    /// Total links to collect across all profiles; 0 = unlimited.
    #[serde(default = "default_target_links")]
    pub target_links: u32,
    #[serde(default = "default_days_limit")]
    pub days_limit: u32,
    #[serde(default = "default_max_scrolls")]
    pub max_scrolls: u32,
    /// Save to the sheet every N new links while scrolling; 0 disables.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_scroll_delay")]
    pub scroll_delay_ms: u64,
    #[serde(default = "default_true")]
    pub fast_mode: bool,
    #[serde(default = "default_true")]
    pub save_backup: bool,
}

fn default_target_links() -> u32 {
    50
}

fn default_days_limit() -> u32 {
    30
}

fn default_max_scrolls() -> u32 {
    15
}

fn default_batch_size() -> u32 {
    25
}

fn default_scroll_delay() -> u64 {
    500
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            target_links: default_target_links(),
            days_limit: default_days_limit(),
            max_scrolls: default_max_scrolls(),
            batch_size: default_batch_size(),
            scroll_delay_ms: default_scroll_delay(),
            fast_mode: true,
            save_backup: true,
        }
    }
}

impl ScrapingConfig {
    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// BrowserConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Chrome user-data dir holding a logged-in Instagram session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_dir: Option<String>,
    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout_secs: u64,
    #[serde(default = "default_implicit_wait")]
    pub implicit_wait_secs: u64,
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string()
}

fn default_page_load_timeout() -> u64 {
    20
}

fn default_implicit_wait() -> u64 {
    5
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: false,
            user_agent: default_user_agent(),
            profile_dir: None,
            page_load_timeout_secs: default_page_load_timeout(),
            implicit_wait_secs: default_implicit_wait(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_true")]
    pub extract_descriptions: bool,
    #[serde(default)]
    pub upload_to_drive: bool,
    #[serde(default = "default_true")]
    pub delete_local_after_upload: bool,
    /// Netscape cookie jar passed to yt-dlp when present.
    #[serde(default = "default_cookies_file")]
    pub cookies_file: String,
    #[serde(default = "default_description_timeout")]
    pub description_timeout_secs: u64,
}

fn default_cookies_file() -> String {
    paths::DEFAULT_COOKIES_FILE.to_string()
}

fn default_description_timeout() -> u64 {
    30
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            extract_descriptions: true,
            upload_to_drive: false,
            delete_local_after_upload: true,
            cookies_file: default_cookies_file(),
            description_timeout_secs: default_description_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// DownloadConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_download_dir")]
    pub directory: String,
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
    /// Extra attempts for a failed download.
    #[serde(default = "default_download_retries")]
    pub retries: u32,
}

fn default_download_dir() -> String {
    paths::DEFAULT_DOWNLOAD_DIR.to_string()
}

fn default_download_timeout() -> u64 {
    120
}

fn default_download_retries() -> u32 {
    2
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: default_download_dir(),
            timeout_secs: default_download_timeout(),
            retries: default_download_retries(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConcurrencyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_description_workers")]
    pub max_description_workers: usize,
}

fn default_description_workers() -> usize {
    5
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_description_workers: default_description_workers(),
        }
    }
}

impl ConcurrencyConfig {
    pub fn description_workers(&self) -> usize {
        if self.enabled {
            self.max_description_workers.max(1)
        } else {
            1
        }
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    2000
}

fn default_backoff() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            backoff_factor: default_backoff(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookConfig / LoggingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Default resume URL for `notify` when none is passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    120
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_webhook_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub scraping: ScrapingConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            sources: SourcesConfig::default(),
            google: GoogleConfig::default(),
            sheets: SheetsConfig::default(),
            drive: DriveConfig::default(),
            scraping: ScrapingConfig::default(),
            browser: BrowserConfig::default(),
            processing: ProcessingConfig::default(),
            download: DownloadConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
            webhook: WebhookConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Starter config written by `reelpipe config init`.
    pub fn template() -> Self {
        let mut cfg = Self::default();
        cfg.sources.instagram_urls = vec!["https://www.instagram.com/your_account/".to_string()];
        cfg
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::NotInitialized);
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Apply `REELPIPE_*` overrides. `lookup` is normally `std::env::var`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("REELPIPE_SPREADSHEET_ID").filter(|v| !v.trim().is_empty()) {
            self.sheets.spreadsheet_id = id;
        }
        if let Some(url) = lookup("REELPIPE_WEBHOOK_URL").filter(|v| !v.trim().is_empty()) {
            self.webhook.url = Some(url);
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.sheets.spreadsheet_id.trim().is_empty() {
            error("missing required config key 'sheets.spreadsheet_id'".to_string());
        }
        if self.sources.instagram_urls.is_empty() {
            error("missing required config key 'sources.instagram_urls' (needs at least one URL)".to_string());
        }
        if self.concurrency.enabled && self.concurrency.max_description_workers == 0 {
            error("concurrency.max_description_workers must be at least 1".to_string());
        }

        let mut warn = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message,
            })
        };

        for url in &self.sources.instagram_urls {
            if !url.contains("instagram.com/") {
                warn(format!("sources.instagram_urls entry '{url}' is not an instagram.com URL"));
            }
        }
        if self.processing.upload_to_drive && self.drive.folder_id.is_none() {
            warn("processing.upload_to_drive is on but drive.folder_id is unset; files go to the Drive root".to_string());
        }
        if self.retry.max_attempts == 0 {
            warn("retry.max_attempts=0 is treated as 1".to_string());
        }
        if self.retry.max_attempts > 10 {
            warn(format!(
                "retry.max_attempts={} (>10 is unusual)",
                self.retry.max_attempts
            ));
        }
        if self.retry.backoff_factor < 1.0 {
            warn(format!(
                "retry.backoff_factor={} is below 1.0; delays will not grow",
                self.retry.backoff_factor
            ));
        }
        if self.scraping.max_scrolls == 0 {
            warn("scraping.max_scrolls=0 only collects the first screen of each profile".to_string());
        }

        warnings
    }

    /// Fail with the first error-level finding from [`Config::validate`].
    pub fn ensure_required(&self) -> Result<()> {
        if self.sheets.spreadsheet_id.trim().is_empty() {
            return Err(PipelineError::MissingConfig("sheets.spreadsheet_id".into()));
        }
        if self.sources.instagram_urls.is_empty() {
            return Err(PipelineError::MissingConfig("sources.instagram_urls".into()));
        }
        if let Some(w) = self
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            return Err(PipelineError::InvalidConfig(w.message));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid() -> Config {
        let mut cfg = Config::template();
        cfg.sheets.spreadsheet_id = "sheet-123".to_string();
        cfg
    }

    #[test]
    fn default_config_roundtrip() {
        let cfg = valid();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.sheets.spreadsheet_id, "sheet-123");
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.scraping.target_links, 50);
    }

    #[test]
    fn minimal_yaml_uses_defaults() {
        let yaml = "sheets:\n  spreadsheet_id: abc\nsources:\n  instagram_urls: [\"https://www.instagram.com/a/\"]\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.sheets.worksheet, "Sheet1");
        assert_eq!(cfg.scraping.days_limit, 30);
        assert_eq!(cfg.browser.webdriver_url, "http://localhost:9515");
        assert!(cfg.processing.extract_descriptions);
        assert!(!cfg.processing.upload_to_drive);
        assert!(cfg.ensure_required().is_ok());
    }

    #[test]
    fn optional_keys_not_serialized_when_unset() {
        let yaml = serde_yaml::to_string(&valid()).unwrap();
        assert!(!yaml.contains("folder_id"));
        assert!(!yaml.contains("token_command"));
    }

    #[test]
    fn missing_spreadsheet_id_is_an_error() {
        let cfg = Config::template();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| {
            w.level == WarnLevel::Error && w.message.contains("sheets.spreadsheet_id")
        }));
        assert!(matches!(
            cfg.ensure_required(),
            Err(PipelineError::MissingConfig(k)) if k == "sheets.spreadsheet_id"
        ));
    }

    #[test]
    fn missing_urls_is_an_error() {
        let mut cfg = valid();
        cfg.sources.instagram_urls.clear();
        assert!(matches!(
            cfg.ensure_required(),
            Err(PipelineError::MissingConfig(k)) if k == "sources.instagram_urls"
        ));
    }

    #[test]
    fn valid_config_has_no_warnings() {
        assert!(valid().validate().is_empty());
    }

    #[test]
    fn non_instagram_url_warns() {
        let mut cfg = valid();
        cfg.sources.instagram_urls.push("https://example.com/x".into());
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("example.com")));
        assert!(cfg.ensure_required().is_ok());
    }

    #[test]
    fn upload_without_folder_warns() {
        let mut cfg = valid();
        cfg.processing.upload_to_drive = true;
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("drive.folder_id")));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::template();
        cfg.apply_env_overrides(|k| match k {
            "REELPIPE_SPREADSHEET_ID" => Some("from-env".into()),
            "REELPIPE_WEBHOOK_URL" => Some("https://n8n.example/webhook".into()),
            _ => None,
        });
        assert_eq!(cfg.sheets.spreadsheet_id, "from-env");
        assert_eq!(cfg.webhook.url.as_deref(), Some("https://n8n.example/webhook"));

        let mut cfg = valid();
        cfg.apply_env_overrides(|_| Some("  ".into()));
        assert_eq!(cfg.sheets.spreadsheet_id, "sheet-123");
    }

    #[test]
    fn retry_policy_from_config() {
        let mut cfg = valid();
        cfg.retry.max_attempts = 0;
        let p = cfg.retry.policy();
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.base_delay, Duration::from_millis(2000));
    }

    #[test]
    fn description_workers_respect_toggle() {
        let mut c = ConcurrencyConfig::default();
        assert_eq!(c.description_workers(), 5);
        c.enabled = false;
        assert_eq!(c.description_workers(), 1);
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&paths::config_path(dir.path())).unwrap_err();
        assert!(matches!(err, PipelineError::NotInitialized));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = paths::config_path(dir.path());
        valid().save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.sources.instagram_urls.len(), 1);
    }
}
