use crate::cmd::processing::print_summary;
use crate::cmd::scrape::scrape_into;
use crate::project::{Project, ScrapeOverrides, Tools};
use anyhow::Context;
use reelpipe_core::pipeline::Processor;
use std::path::Path;

pub fn run(root: &Path, config_path: &Path, overrides: &ScrapeOverrides, json: bool) -> anyhow::Result<()> {
    let mut project = Project::load_required(root, config_path)?;
    project.apply_scrape_overrides(overrides);

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

    let summary = processor
        .run_full(|p, known| scrape_into(&project, p, known))
        .context("full run")?;
    print_summary(&summary, json)
}
