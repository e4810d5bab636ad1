use crate::cmd::processing::print_summary;
use crate::project::{Project, ScrapeOverrides};
use anyhow::Context;
use reelpipe_core::backup;
use reelpipe_core::browser::WebDriverBrowser;
use reelpipe_core::pipeline::{Processor, RunSummary, ScrapeOutcome};
use reelpipe_core::scraper::{CollectedReel, Scraper};
use reelpipe_core::sheet::{AppendReport, SheetStore};
use std::collections::HashSet;
use std::path::Path;

/// Bare `reelpipe`: collect links and append them to the sheet.
pub fn run(root: &Path, config_path: &Path, overrides: &ScrapeOverrides, json: bool) -> anyhow::Result<()> {
    let mut project = Project::load_required(root, config_path)?;
    project.apply_scrape_overrides(overrides);

    let sheet = project.sheet(project.tokens())?;
    sheet.ensure_headers().context("preparing sheet headers")?;
    let known = sheet.existing_reel_ids().context("reading existing reels")?;

    let processor = Processor::new(&sheet, project.options());
    let outcome = scrape_into(&project, &processor, known)?;

    let summary = RunSummary {
        scraped: outcome.scraped,
        appended: outcome.appended,
        ..RunSummary::default()
    };
    print_summary(&summary, json)
}

/// Drive the browser over every configured profile, appending each batch
/// through `processor` while scrolling.
pub fn scrape_into<S: SheetStore>(
    project: &Project,
    processor: &Processor<'_, S>,
    known: HashSet<String>,
) -> reelpipe_core::Result<ScrapeOutcome> {
    let cfg = &project.config;
    tracing::info!(
        "scraping {} profile(s), {} existing reels, target {}, last {} days",
        cfg.sources.instagram_urls.len(),
        known.len(),
        cfg.scraping.target_links,
        cfg.scraping.days_limit
    );
    let browser = WebDriverBrowser::start(&cfg.browser, cfg.scraping.fast_mode)?;

    let mut appended = AppendReport::default();
    let run = {
        let report = &mut appended;
        let mut scraper = Scraper::new(browser, cfg.scraping.clone())
            .with_known_ids(known)
            .on_batch(Box::new(move |batch: &[CollectedReel]| {
                processor.append_batch(batch, report)
            }));
        let run = scraper.run(&cfg.sources.instagram_urls);
        if let Err(e) = scraper.close() {
            tracing::warn!("closing browser: {e}");
        }
        run
    };

    // Links the sheet rejected are already marked known, so the backup is
    // the only place they survive.
    let to_backup = if cfg.scraping.save_backup {
        &run.collected
    } else {
        &run.unsaved
    };
    if !to_backup.is_empty() {
        match backup::save(&project.root, to_backup, chrono::Local::now()) {
            Ok(path) if !run.unsaved.is_empty() => tracing::warn!(
                "{} link(s) were not appended to the sheet; kept in {}",
                run.unsaved.len(),
                path.display()
            ),
            Ok(_) => {}
            Err(e) if !run.unsaved.is_empty() => {
                tracing::error!("{} unsaved link(s) lost, backup not written: {e}", run.unsaved.len())
            }
            Err(e) => tracing::warn!("backup not written: {e}"),
        }
    }

    if let Some(e) = run.sink_error {
        return Err(e);
    }
    Ok(ScrapeOutcome {
        scraped: run.collected.len(),
        appended,
    })
}
