//! Profile scrolling and reel link collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::browser::{fast_mode_css, Browser, ReelTile};
use crate::config::ScrapingConfig;
use crate::error::{PipelineError, Result};
use crate::reel;

/// Consecutive empty scrolls before giving up on a profile.
const MAX_EMPTY_WITH_TARGET: u32 = 5;
const MAX_EMPTY_WITHOUT_TARGET: u32 = 3;
const MAX_SCROLL_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedReel {
    pub url: String,
    pub reel_id: String,
    pub username: String,
}

/// Why the scroll loop for one profile ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    EndOfPage,
    NoNewLinks,
    MaxScrolls,
}

/// Called with each batch of fresh links while scrolling.
pub type BatchSink<'a> = Box<dyn FnMut(&[CollectedReel]) -> Result<()> + 'a>;

/// Outcome of [`Scraper::run`].
#[derive(Debug, Default)]
pub struct ScrapeRun {
    pub collected: Vec<CollectedReel>,
    /// Links from batches the sink rejected, plus every batch after the
    /// first rejection.
    pub unsaved: Vec<CollectedReel>,
    /// First sink failure. Later batches are not offered to the sink.
    pub sink_error: Option<PipelineError>,
}

pub struct Scraper<'a, B: Browser> {
    browser: B,
    cfg: ScrapingConfig,
    fast: bool,
    known: HashSet<String>,
    on_batch: Option<BatchSink<'a>>,
    unsaved: Vec<CollectedReel>,
    sink_error: Option<PipelineError>,
    now: DateTime<Utc>,
}

impl<'a, B: Browser> Scraper<'a, B> {
    pub fn new(browser: B, cfg: ScrapingConfig) -> Self {
        let fast = cfg.fast_mode;
        Self {
            browser,
            cfg,
            fast,
            known: HashSet::new(),
            on_batch: None,
            unsaved: Vec::new(),
            sink_error: None,
            now: Utc::now(),
        }
    }

    /// Reel ids already stored; links for them are skipped.
    pub fn with_known_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.known.extend(ids);
        self
    }

    pub fn on_batch(mut self, sink: BatchSink<'a>) -> Self {
        self.on_batch = Some(sink);
        self
    }

    pub fn fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Collect from every profile until `target_links` (0 = unlimited) new
    /// links are found. A profile whose page fails is logged and skipped;
    /// a failing sink does not stop collection but is reported in the
    /// returned [`ScrapeRun`].
    pub fn run(&mut self, urls: &[String]) -> ScrapeRun {
        let target = self.cfg.target_links as usize;
        let mut all = Vec::new();

        for (i, url) in urls.iter().enumerate() {
            let remaining = if target > 0 {
                let r = target.saturating_sub(all.len());
                if r == 0 {
                    break;
                }
                r
            } else {
                0
            };
            tracing::info!("profile {}/{}: {url}", i + 1, urls.len());

            match self.collect_from_profile(url, remaining) {
                Ok((links, reason)) => {
                    tracing::info!("{url}: {} new links ({reason:?})", links.len());
                    all.extend(links);
                }
                Err(e) => tracing::error!("{url}: {e}"),
            }
        }

        if target > 0 {
            tracing::info!("collected {}/{target} links", all.len());
        } else {
            tracing::info!("collected {} links", all.len());
        }
        ScrapeRun {
            collected: all,
            unsaved: std::mem::take(&mut self.unsaved),
            sink_error: self.sink_error.take(),
        }
    }

    /// Scroll one profile's reels tab. `remaining` of 0 means no target.
    /// Links not yet handed to the sink are flushed even when the page
    /// fails part way.
    pub fn collect_from_profile(
        &mut self,
        profile_url: &str,
        remaining: usize,
    ) -> Result<(Vec<CollectedReel>, StopReason)> {
        let mut links: Vec<CollectedReel> = Vec::new();
        let mut flushed = 0usize;
        let result = self.scroll_profile(profile_url, remaining, &mut links, &mut flushed);
        if flushed < links.len() {
            self.flush_batch(&links[flushed..]);
        }
        result.map(|reason| (links, reason))
    }

    fn scroll_profile(
        &mut self,
        profile_url: &str,
        remaining: usize,
        links: &mut Vec<CollectedReel>,
        flushed: &mut usize,
    ) -> Result<StopReason> {
        let username = reel::extract_username(profile_url);
        self.browser.open(&reel::reels_tab_url(profile_url))?;
        match self.browser.dismiss_popups() {
            Ok(n) if n > 0 => tracing::debug!("dismissed {n} dialogs"),
            Ok(_) => {}
            Err(e) => tracing::debug!("popup check failed: {e}"),
        }
        if self.fast {
            if let Err(e) = self.browser.inject_css(fast_mode_css()) {
                tracing::debug!("fast mode css not applied: {e}");
            }
        }

        self.collect_visible(&username, links)?;
        if remaining > 0 && links.len() >= remaining {
            links.truncate(remaining);
            return Ok(StopReason::TargetReached);
        }

        let base_delay = self.cfg.scroll_delay();
        let max_empty = if remaining > 0 {
            MAX_EMPTY_WITH_TARGET
        } else {
            MAX_EMPTY_WITHOUT_TARGET
        };
        let mut last_height = self.browser.scroll_height()?;
        let mut empty_scrolls = 0u32;
        let mut reason = StopReason::MaxScrolls;

        for scroll in 0..self.cfg.max_scrolls {
            let delay = scroll_delay(base_delay, empty_scrolls);
            for step in 1..=2 {
                self.browser.scroll_to(last_height / 3 * step)?;
                pause(delay / 4);
            }
            self.browser.scroll_to_bottom()?;
            pause(delay / 4);

            let found = self.collect_visible(&username, links)?;
            tracing::debug!("scroll {}: {found} new, {} total", scroll + 1, links.len());

            if remaining > 0 && links.len() >= remaining {
                links.truncate(remaining);
                reason = StopReason::TargetReached;
                break;
            }

            let batch = self.cfg.batch_size as usize;
            if batch > 0 && links.len() >= *flushed + batch {
                self.flush_batch(&links[*flushed..]);
                *flushed = links.len();
            }

            let height = self.browser.scroll_height()?;
            if found == 0 {
                empty_scrolls += 1;
            } else {
                empty_scrolls = 0;
            }

            if height == last_height && empty_scrolls >= 2 {
                reason = StopReason::EndOfPage;
                break;
            }
            if empty_scrolls >= max_empty {
                reason = StopReason::NoNewLinks;
                break;
            }
            last_height = height;
        }
        Ok(reason)
    }

    pub fn close(&mut self) -> Result<()> {
        self.browser.close()
    }

    /// Add unseen, recent reels on screen to `links`. Returns how many.
    fn collect_visible(&mut self, username: &str, links: &mut Vec<CollectedReel>) -> Result<usize> {
        let mut added = 0;
        for ReelTile { href, time } in self.browser.reel_tiles()? {
            let Some(url) = reel::canonical_url(&href) else {
                continue;
            };
            let Some(reel_id) = reel::extract_reel_id(&url) else {
                continue;
            };
            if self.known.contains(&reel_id) {
                continue;
            }
            if let Some(t) = &time {
                if !is_recent(t, self.cfg.days_limit, self.now) {
                    tracing::debug!("skipping {reel_id}: posted '{t}'");
                    continue;
                }
            }
            self.known.insert(reel_id.clone());
            links.push(CollectedReel {
                url,
                reel_id,
                username: username.to_string(),
            });
            added += 1;
        }
        Ok(added)
    }

    /// Hand `batch` to the sink. A rejected batch is kept in `unsaved` and
    /// the sink is not called again for this run.
    fn flush_batch(&mut self, batch: &[CollectedReel]) {
        if batch.is_empty() {
            return;
        }
        let Some(sink) = self.on_batch.as_mut() else {
            return;
        };
        if self.sink_error.is_some() {
            self.unsaved.extend_from_slice(batch);
            return;
        }
        tracing::info!("saving batch of {} links", batch.len());
        if let Err(e) = sink(batch) {
            tracing::error!("saving batch of {} links failed: {e}", batch.len());
            self.unsaved.extend_from_slice(batch);
            self.sink_error = Some(e);
        }
    }
}

/// Delay before the next scroll: ×1.2 once more than two scrolls in a row
/// found nothing, never above one second.
fn scroll_delay(base: Duration, empty_scrolls: u32) -> Duration {
    if empty_scrolls > 2 {
        base.mul_f64(1.2).min(MAX_SCROLL_DELAY)
    } else {
        base
    }
}

/// `time` is either an ISO timestamp or relative text shown on the grid.
pub fn is_recent(time: &str, days_limit: u32, now: DateTime<Utc>) -> bool {
    match DateTime::parse_from_rfc3339(time.trim()) {
        Ok(posted) => {
            let age = now.signed_duration_since(posted.with_timezone(&Utc));
            age.num_days() <= i64::from(days_limit)
        }
        Err(_) => reel::is_within_days_limit(time, days_limit),
    }
}

fn pause(d: Duration) {
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
