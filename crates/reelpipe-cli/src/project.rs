use anyhow::Context;
use reelpipe_core::auth::TokenSource;
use reelpipe_core::config::Config;
use reelpipe_core::drive::DriveClient;
use reelpipe_core::pipeline::{PipelineOptions, Processor};
use reelpipe_core::sheet::{ReelSheet, SheetStore};
use reelpipe_core::sheets_api::SheetsClient;
use reelpipe_core::ytdlp::YtDlp;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scroll delay ceiling applied by `--fast`.
const FAST_SCROLL_DELAY_MS: u64 = 300;

/// Scrape flags given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOverrides {
    pub fast: bool,
    pub days: Option<u32>,
    pub limit: Option<u32>,
}

/// Loaded config plus the root it was resolved against.
pub struct Project {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config: Config,
}

impl Project {
    pub fn load(root: &Path, config_path: &Path) -> anyhow::Result<Self> {
        let mut config = Config::load(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;
        config.apply_env_overrides(|k| std::env::var(k).ok());
        Ok(Self {
            root: root.to_path_buf(),
            config_path: config_path.to_path_buf(),
            config,
        })
    }

    /// [`Project::load`] and fail on missing required keys. Called before
    /// any network access.
    pub fn load_required(root: &Path, config_path: &Path) -> anyhow::Result<Self> {
        let project = Self::load(root, config_path)?;
        project
            .config
            .ensure_required()
            .with_context(|| format!("checking {}", config_path.display()))?;
        Ok(project)
    }

    pub fn apply_scrape_overrides(&mut self, o: &ScrapeOverrides) {
        let scraping = &mut self.config.scraping;
        if o.fast {
            scraping.fast_mode = true;
            scraping.scroll_delay_ms = scraping.scroll_delay_ms.min(FAST_SCROLL_DELAY_MS);
            self.config.browser.headless = true;
        }
        if let Some(days) = o.days {
            scraping.days_limit = days;
        }
        if let Some(limit) = o.limit {
            scraping.target_links = limit;
        }
    }

    pub fn tokens(&self) -> Arc<TokenSource> {
        Arc::new(TokenSource::from_config(&self.config.google))
    }

    pub fn sheet(&self, tokens: Arc<TokenSource>) -> anyhow::Result<ReelSheet<SheetsClient>> {
        let client = SheetsClient::new(&self.config, tokens).context("creating Sheets client")?;
        Ok(ReelSheet::new(client).with_formatting(self.config.sheets.setup_formatting))
    }

    pub fn ytdlp(&self) -> anyhow::Result<YtDlp> {
        Ok(YtDlp::from_config(&self.root, &self.config)?)
    }

    pub fn drive(&self, tokens: Arc<TokenSource>) -> anyhow::Result<DriveClient> {
        DriveClient::new(&self.config, tokens).context("creating Drive client")
    }

    pub fn options(&self) -> PipelineOptions {
        PipelineOptions::from_config(&self.root, &self.config)
    }
}

/// External tools a command needs, loaded up front so a missing yt-dlp
/// fails before the sheet is touched.
#[derive(Default)]
pub struct Tools {
    pub ytdlp: Option<YtDlp>,
    pub drive: Option<DriveClient>,
}

impl Tools {
    pub fn load(
        project: &Project,
        tokens: Arc<TokenSource>,
        descriptions: bool,
        uploads: bool,
    ) -> anyhow::Result<Self> {
        let ytdlp = if descriptions || uploads {
            Some(project.ytdlp()?)
        } else {
            None
        };
        let drive = if uploads {
            Some(project.drive(tokens)?)
        } else {
            None
        };
        Ok(Self { ytdlp, drive })
    }

    pub fn attach<'a, S: SheetStore>(&'a self, mut processor: Processor<'a, S>) -> Processor<'a, S> {
        if let Some(tool) = &self.ytdlp {
            processor = processor.with_descriptions(tool);
            if let Some(drive) = &self.drive {
                processor = processor.with_media(tool, drive);
            }
        }
        processor
    }
}
