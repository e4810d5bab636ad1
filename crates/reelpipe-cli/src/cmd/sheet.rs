use crate::output::print_json;
use crate::project::Project;
use anyhow::Context;
use clap::Subcommand;
use reelpipe_core::sheet::SheetStore;
use std::path::Path;

#[derive(Subcommand)]
pub enum SheetSubcommand {
    /// Write the header row and install the status dropdown and colours
    Setup,
}

pub fn run(root: &Path, config_path: &Path, subcmd: SheetSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SheetSubcommand::Setup => setup(root, config_path, json),
    }
}

fn setup(root: &Path, config_path: &Path, json: bool) -> anyhow::Result<()> {
    let project = Project::load_required(root, config_path)?;
    // Formatting is applied explicitly below.
    let sheet = project.sheet(project.tokens())?.with_formatting(false);
    let headers_written = sheet.ensure_headers().context("writing headers")?;
    sheet
        .store()
        .setup_status_formatting()
        .context("installing status formatting")?;

    if json {
        return print_json(&serde_json::json!({
            "headers_written": headers_written,
            "formatting": true,
        }));
    }
    if headers_written {
        println!("Headers written.");
    } else {
        println!("Headers already present.");
    }
    println!("Status dropdown and colours installed.");
    Ok(())
}
