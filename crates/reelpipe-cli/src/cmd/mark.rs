use crate::output::print_json;
use crate::project::Project;
use anyhow::Context;
use reelpipe_core::pipeline::Processor;
use reelpipe_core::types::Status;
use std::path::Path;

pub fn run(
    root: &Path,
    config_path: &Path,
    reel_id: &str,
    status: &str,
    posted_date: Option<&str>,
    shorts_id: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    // Reject bad input before loading config or touching the network.
    let status: Status = status.parse()?;

    let project = Project::load_required(root, config_path)?;
    let sheet = project.sheet(project.tokens())?;
    let row = Processor::new(&sheet, project.options())
        .mark(reel_id, status, posted_date, shorts_id)
        .with_context(|| format!("marking {reel_id} as {status}"))?;

    if json {
        return print_json(&row);
    }
    println!("{} (row {}) -> {}", row.reel_id, row.row_index, row.status);
    Ok(())
}
