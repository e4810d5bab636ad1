use crate::cmd::processing::print_descriptions;
use crate::output::print_json;
use crate::project::{Project, Tools};
use anyhow::Context;
use reelpipe_core::pipeline::Processor;
use std::path::Path;

pub fn run(root: &Path, config_path: &Path, json: bool) -> anyhow::Result<()> {
    let project = Project::load_required(root, config_path)?;
    let tokens = project.tokens();
    let tools = Tools::load(&project, tokens.clone(), true, false)?;
    let sheet = project.sheet(tokens)?;
    let processor = tools.attach(Processor::new(&sheet, project.options()));

    let report = processor
        .process_missing_descriptions()
        .context("filling missing descriptions")?;
    if json {
        return print_json(&report);
    }
    print_descriptions(&report);
    Ok(())
}
