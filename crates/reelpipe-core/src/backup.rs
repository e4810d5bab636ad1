//! Local JSON copy of scraped links, written after a scrape and whenever
//! the sheet refuses a batch.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::paths;
use crate::reel::sheet_date;
use crate::scraper::CollectedReel;
use crate::types::Status;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub date: String,
    pub username: String,
    pub url: String,
    pub reel_id: String,
    pub status: String,
}

/// Write `backups/links-<YYYYmmdd_HHMMSS>.json` under `root`.
pub fn save(root: &Path, reels: &[CollectedReel], now: DateTime<Local>) -> Result<PathBuf> {
    let date = sheet_date(now.date_naive());
    let entries: Vec<BackupEntry> = reels
        .iter()
        .map(|r| BackupEntry {
            date: date.clone(),
            username: r.username.clone(),
            url: r.url.clone(),
            reel_id: r.reel_id.clone(),
            status: Status::Pending.to_string(),
        })
        .collect();
    let path = paths::backups_dir(root).join(format!("links-{}.json", now.format("%Y%m%d_%H%M%S")));
    let data = serde_json::to_string_pretty(&entries)?;
    crate::io::atomic_write(&path, data.as_bytes())?;
    tracing::info!("backup of {} links saved to {}", entries.len(), path.display());
    Ok(path)
}

pub fn load(path: &Path) -> Result<Vec<BackupEntry>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
