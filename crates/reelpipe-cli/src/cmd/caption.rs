use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use reelpipe_core::caption::{Caption, MAX_TAGS_CHARS};
use std::io::Read;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum CaptionSubcommand {
    /// Validate caption JSON from a file, or stdin when no file is given
    Check {
        file: Option<PathBuf>,
    },
}

pub fn run(subcmd: CaptionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CaptionSubcommand::Check { file } => check(file, json),
    }
}

fn check(file: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let data = match &file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };

    let caption = Caption::parse(&data)?;
    if json {
        return print_json(&caption);
    }
    println!("ok: {}", caption.title);
    println!(
        "  {} tag(s), {}/{MAX_TAGS_CHARS} chars; description {} chars",
        caption.tags.len(),
        caption.tags_len(),
        caption.description.chars().count()
    );
    Ok(())
}
