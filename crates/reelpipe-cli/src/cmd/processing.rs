use crate::output::{id_list, print_json};
use crate::project::{Project, Tools};
use anyhow::Context;
use reelpipe_core::pipeline::{DescriptionReport, Processor, RunSummary, UploadReport};
use std::path::Path;

/// Descriptions and uploads per the `processing` toggles, no scraping.
pub fn run(root: &Path, config_path: &Path, json: bool) -> anyhow::Result<()> {
    let project = Project::load_required(root, config_path)?;
    let opts = project.options();
    let tokens = project.tokens();
    let tools = Tools::load(
        &project,
        tokens.clone(),
        opts.extract_descriptions,
        opts.upload_to_drive,
    )?;
    let sheet = project.sheet(tokens)?;
    let processor = tools.attach(Processor::new(&sheet, opts));

    let summary = processor.run_processing().context("processing pending rows")?;
    print_summary(&summary, json)
}

pub fn print_summary(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(summary);
    }
    if summary.scraped > 0 || !summary.appended.added.is_empty() || !summary.appended.skipped.is_empty() {
        println!(
            "Scraped {} link(s): {} added, {} already in sheet",
            summary.scraped,
            summary.appended.added.len(),
            summary.appended.skipped.len()
        );
    }
    if let Some(d) = &summary.descriptions {
        print_descriptions(d);
    }
    if let Some(u) = &summary.uploads {
        print_uploads(u);
    }
    if summary.descriptions.is_none() && summary.uploads.is_none() && summary.scraped == 0 {
        println!("Nothing to do.");
    }
    Ok(())
}

pub fn print_descriptions(report: &DescriptionReport) {
    println!(
        "Descriptions: {} updated, {} empty, {} failed",
        report.updated.len(),
        report.empty.len(),
        report.failed.len()
    );
    if !report.failed.is_empty() {
        println!("  failed: {}", id_list(&report.failed, 10));
    }
}

pub fn print_uploads(report: &UploadReport) {
    println!(
        "Uploads: {} uploaded, {} failed",
        report.uploaded.len(),
        report.failed.len()
    );
    for u in &report.uploaded {
        println!("  {} -> {}", u.reel_id, u.file_id);
    }
    if !report.failed.is_empty() {
        println!("  failed: {}", id_list(&report.failed, 10));
    }
}
