//! Orchestration: new reels into the sheet, description backfill, and the
//! download + Drive upload pass over pending rows.
//!
//! External tools sit behind three traits so the processor can run against
//! [`crate::sheet::MemorySheet`] and fakes in tests:
//!
//! - [`DescriptionSource`]: reel caption text (yt-dlp)
//! - [`MediaFetcher`]: local mp4 for a reel (yt-dlp)
//! - [`MediaStore`]: remote storage returning a file id (Drive)

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Config;
use crate::drive::DriveClient;
use crate::error::{PipelineError, Result};
use crate::paths;
use crate::reel::sheet_date;
use crate::scraper::CollectedReel;
use crate::sheet::{count_by_status, AppendReport, ReelSheet, SheetStore};
use crate::types::{ReelRow, Status};
use crate::ytdlp::YtDlp;

pub trait DescriptionSource: Sync {
    fn description(&self, url: &str) -> Result<String>;
}

pub trait MediaFetcher {
    fn fetch(&self, url: &str, reel_id: &str, dir: &Path) -> Result<PathBuf>;
}

pub trait MediaStore {
    /// Store the file and return its remote id.
    fn store(&self, path: &Path) -> Result<String>;
}

impl DescriptionSource for YtDlp {
    fn description(&self, url: &str) -> Result<String> {
        YtDlp::description(self, url)
    }
}

impl MediaFetcher for YtDlp {
    fn fetch(&self, url: &str, reel_id: &str, dir: &Path) -> Result<PathBuf> {
        self.download(url, reel_id, dir)
    }
}

impl MediaStore for DriveClient {
    fn store(&self, path: &Path) -> Result<String> {
        self.upload_file(path)
    }
}

// ---------------------------------------------------------------------------
// Options and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOptions {
    pub extract_descriptions: bool,
    pub upload_to_drive: bool,
    pub delete_local_after_upload: bool,
    pub description_workers: usize,
    pub download_dir: PathBuf,
}

impl PipelineOptions {
    pub fn from_config(root: &Path, cfg: &Config) -> Self {
        Self {
            extract_descriptions: cfg.processing.extract_descriptions,
            upload_to_drive: cfg.processing.upload_to_drive,
            delete_local_after_upload: cfg.processing.delete_local_after_upload,
            description_workers: cfg.concurrency.description_workers(),
            download_dir: paths::resolve(root, &cfg.download.directory),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DescriptionReport {
    pub updated: Vec<String>,
    /// Reels where the tool returned nothing.
    pub empty: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Upload {
    pub reel_id: String,
    pub file_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub uploaded: Vec<Upload>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeOutcome {
    pub scraped: usize,
    pub appended: AppendReport,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub scraped: usize,
    pub appended: AppendReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptions: Option<DescriptionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploads: Option<UploadReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub counts: BTreeMap<String, usize>,
    pub total: usize,
    pub missing_descriptions: usize,
    pub extract_descriptions: bool,
    pub upload_to_drive: bool,
    pub description_workers: usize,
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

pub struct Processor<'a, S: SheetStore> {
    sheet: &'a ReelSheet<S>,
    opts: PipelineOptions,
    descriptions: Option<&'a dyn DescriptionSource>,
    media: Option<&'a dyn MediaFetcher>,
    storage: Option<&'a dyn MediaStore>,
    today: NaiveDate,
}

impl<'a, S: SheetStore> Processor<'a, S> {
    pub fn new(sheet: &'a ReelSheet<S>, opts: PipelineOptions) -> Self {
        Self {
            sheet,
            opts,
            descriptions: None,
            media: None,
            storage: None,
            today: Local::now().date_naive(),
        }
    }

    pub fn with_descriptions(mut self, src: &'a dyn DescriptionSource) -> Self {
        self.descriptions = Some(src);
        self
    }

    pub fn with_media(mut self, fetcher: &'a dyn MediaFetcher, storage: &'a dyn MediaStore) -> Self {
        self.media = Some(fetcher);
        self.storage = Some(storage);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.opts
    }

    /// Append freshly scraped reels as `pending` rows, with descriptions
    /// when extraction is enabled. Reels already in the sheet are skipped
    /// without touching yt-dlp.
    pub fn process_new_reels(&self, reels: &[CollectedReel]) -> Result<AppendReport> {
        let known = self.sheet.existing_reel_ids()?;
        let date = sheet_date(self.today);
        let mut rows: Vec<ReelRow> = Vec::new();
        let mut skipped = Vec::new();
        let mut batch_ids = HashSet::new();
        for r in reels {
            if known.contains(&r.reel_id) || !batch_ids.insert(r.reel_id.clone()) {
                skipped.push(r.reel_id.clone());
                continue;
            }
            rows.push(ReelRow::new_pending(&date, &r.username, &r.url, &r.reel_id));
        }

        if self.opts.extract_descriptions {
            if let Some(src) = self.descriptions {
                let urls: Vec<String> = rows.iter().map(|r| r.link.clone()).collect();
                for (row, result) in rows.iter_mut().zip(self.describe_all(src, &urls)) {
                    match result {
                        Ok(text) => row.description = text,
                        Err(e) => tracing::warn!("description for {} failed: {e}", row.reel_id),
                    }
                }
            }
        }

        let mut report = self.sheet.append_reels(&rows)?;
        skipped.append(&mut report.skipped);
        report.skipped = skipped;
        Ok(report)
    }

    /// Fill the Description cell of `pending` rows that have none. Fetching
    /// runs on up to `description_workers` threads; sheet writes stay on
    /// this thread, one row at a time.
    pub fn process_missing_descriptions(&self) -> Result<DescriptionReport> {
        let src = self
            .descriptions
            .ok_or_else(|| PipelineError::Tool("no description source configured".into()))?;
        let rows = self.sheet.rows_missing_description(Status::Pending)?;
        let mut report = DescriptionReport::default();
        if rows.is_empty() {
            tracing::info!("no pending rows without a description");
            return Ok(report);
        }
        tracing::info!(
            "extracting descriptions for {} row(s) with {} worker(s)",
            rows.len(),
            self.opts.description_workers.min(rows.len())
        );

        let urls: Vec<String> = rows.iter().map(|r| r.link.clone()).collect();
        for (row, result) in rows.iter().zip(self.describe_all(src, &urls)) {
            match result {
                Ok(text) if text.trim().is_empty() => report.empty.push(row.reel_id.clone()),
                Ok(text) => match self.sheet.set_description(row.row_index, &text) {
                    Ok(()) => report.updated.push(row.reel_id.clone()),
                    Err(e) => {
                        tracing::error!("row {}: writing description failed: {e}", row.row_index);
                        report.failed.push(row.reel_id.clone());
                    }
                },
                Err(e) => {
                    tracing::warn!("row {} ({}): {e}", row.row_index, row.reel_id);
                    report.failed.push(row.reel_id.clone());
                }
            }
        }
        tracing::info!(
            "descriptions: {} updated, {} empty, {} failed",
            report.updated.len(),
            report.empty.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Download and upload every `pending` row in sheet order. Success moves
    /// the row to `processing`, failure to `failed`.
    pub fn process_pending_uploads(&self) -> Result<UploadReport> {
        let (Some(media), Some(storage)) = (self.media, self.storage) else {
            return Err(PipelineError::Tool("no media fetcher/storage configured".into()));
        };
        let rows = self.sheet.rows_by_status(Status::Pending)?;
        let mut report = UploadReport::default();
        tracing::info!("{} pending row(s) to upload", rows.len());

        for row in rows {
            match self.upload_row(&row, media, storage) {
                Ok(file_id) => match self.sheet.set_status(row.row_index, Status::Processing) {
                    Ok(_) => report.uploaded.push(Upload {
                        reel_id: row.reel_id.clone(),
                        file_id,
                    }),
                    Err(e) => {
                        tracing::error!(
                            "row {} ({}): uploaded as {file_id} but status not updated: {e}",
                            row.row_index,
                            row.reel_id
                        );
                        report.failed.push(row.reel_id.clone());
                    }
                },
                Err(e) => {
                    tracing::error!("row {} ({}): {e}", row.row_index, row.reel_id);
                    if let Err(e) = self.sheet.set_status(row.row_index, Status::Failed) {
                        tracing::error!("row {}: could not mark failed: {e}", row.row_index);
                    }
                    report.failed.push(row.reel_id.clone());
                }
            }
        }
        Ok(report)
    }

    /// The download is removed after an upload when configured, and always
    /// after a failed one. A failed delete only warns.
    fn upload_row(&self, row: &ReelRow, media: &dyn MediaFetcher, storage: &dyn MediaStore) -> Result<String> {
        let path = media.fetch(&row.link, &row.reel_id, &self.opts.download_dir)?;
        let result = storage.store(&path);
        if result.is_err() || self.opts.delete_local_after_upload {
            if let Err(e) = crate::io::remove_if_exists(&path) {
                tracing::warn!("could not remove {}: {e}", path.display());
            }
        }
        result
    }

    /// Append one scraped batch and fold the outcome into `into`. Used as
    /// the scraper's batch sink so rows land in the sheet while scrolling.
    pub fn append_batch(&self, batch: &[CollectedReel], into: &mut AppendReport) -> Result<()> {
        let report = self.process_new_reels(batch)?;
        into.added.extend(report.added);
        into.skipped.extend(report.skipped);
        Ok(())
    }

    /// Scrape, then the enabled processing steps. `scrape` receives the
    /// Reel IDs already in the sheet and appends what it finds, normally
    /// through [`Processor::append_batch`].
    pub fn run_full<F>(&self, scrape: F) -> Result<RunSummary>
    where
        F: FnOnce(&Self, HashSet<String>) -> Result<ScrapeOutcome>,
    {
        self.sheet.ensure_headers()?;
        let outcome = scrape(self, self.sheet.existing_reel_ids()?)?;
        let mut summary = RunSummary {
            scraped: outcome.scraped,
            appended: outcome.appended,
            ..RunSummary::default()
        };
        summary.descriptions = self.run_descriptions_if_enabled()?;
        summary.uploads = self.run_uploads_if_enabled()?;
        Ok(summary)
    }

    /// Descriptions and uploads without scraping.
    pub fn run_processing(&self) -> Result<RunSummary> {
        Ok(RunSummary {
            descriptions: self.run_descriptions_if_enabled()?,
            uploads: self.run_uploads_if_enabled()?,
            ..RunSummary::default()
        })
    }

    fn run_descriptions_if_enabled(&self) -> Result<Option<DescriptionReport>> {
        if self.opts.extract_descriptions && self.descriptions.is_some() {
            Ok(Some(self.process_missing_descriptions()?))
        } else {
            Ok(None)
        }
    }

    fn run_uploads_if_enabled(&self) -> Result<Option<UploadReport>> {
        if self.opts.upload_to_drive && self.media.is_some() {
            Ok(Some(self.process_pending_uploads()?))
        } else {
            Ok(None)
        }
    }

    pub fn status_report(&self) -> Result<StatusReport> {
        let rows = self.sheet.rows()?;
        let missing = rows
            .iter()
            .filter(|r| r.parsed_status() == Some(Status::Pending) && !r.has_description())
            .count();
        Ok(StatusReport {
            counts: count_by_status(&rows),
            total: rows.len(),
            missing_descriptions: missing,
            extract_descriptions: self.opts.extract_descriptions,
            upload_to_drive: self.opts.upload_to_drive,
            description_workers: self.opts.description_workers,
        })
    }

    /// Validated status update for one reel, optionally recording the
    /// YouTube posting.
    pub fn mark(
        &self,
        reel_id: &str,
        status: Status,
        posted_date: Option<&str>,
        shorts_id: Option<&str>,
    ) -> Result<ReelRow> {
        let row = self.sheet.find_by_reel_id(reel_id)?;
        self.sheet.set_status(row.row_index, status)?;
        self.sheet.set_youtube(row.row_index, posted_date, shorts_id)?;
        self.sheet.find_by_reel_id(reel_id)
    }

    /// Run `src` over `urls` on up to `description_workers` threads. Results
    /// come back in input order.
    fn describe_all(&self, src: &dyn DescriptionSource, urls: &[String]) -> Vec<Result<String>> {
        let workers = self.opts.description_workers.max(1).min(urls.len());
        if workers <= 1 {
            return urls.iter().map(|u| src.description(u)).collect();
        }

        let next = AtomicUsize::new(0);
        let mut indexed: Vec<(usize, Result<String>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut out = Vec::new();
                        loop {
                            let i = next.fetch_add(1, Ordering::SeqCst);
                            let Some(url) = urls.get(i) else {
                                break;
                            };
                            out.push((i, src.description(url)));
                        }
                        out
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(out) => out,
                    Err(_) => {
                        tracing::error!("description worker panicked");
                        Vec::new()
                    }
                })
                .collect()
        });

        indexed.sort_by_key(|(i, _)| *i);
        let mut results: Vec<Result<String>> = Vec::with_capacity(urls.len());
        let mut indexed = indexed.into_iter().peekable();
        for i in 0..urls.len() {
            match indexed.next_if(|(j, _)| *j == i) {
                Some((_, r)) => results.push(r),
                None => results.push(Err(PipelineError::Tool("description worker panicked".into()))),
            }
        }
        results
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
