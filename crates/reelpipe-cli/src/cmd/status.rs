use crate::output::{print_json, print_table};
use crate::project::Project;
use anyhow::Context;
use reelpipe_core::pipeline::{Processor, StatusReport};
use reelpipe_core::ytdlp;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct StatusOutput {
    #[serde(flatten)]
    report: StatusReport,
    yt_dlp: bool,
    ffmpeg: bool,
}

pub fn run(root: &Path, config_path: &Path, json: bool) -> anyhow::Result<()> {
    let project = Project::load_required(root, config_path)?;
    let sheet = project.sheet(project.tokens())?;
    let report = Processor::new(&sheet, project.options())
        .status_report()
        .context("reading sheet")?;
    let out = StatusOutput {
        report,
        yt_dlp: ytdlp::detect().is_ok(),
        ffmpeg: ytdlp::ffmpeg_available(),
    };

    if json {
        return print_json(&out);
    }

    let rows: Vec<Vec<String>> = out
        .report
        .counts
        .iter()
        .map(|(status, n)| vec![status.clone(), n.to_string()])
        .collect();
    print_table(&["STATUS", "ROWS"], &rows);
    println!();
    println!("Total:                {}", out.report.total);
    println!("Missing descriptions: {}", out.report.missing_descriptions);
    println!("Extract descriptions: {}", on_off(out.report.extract_descriptions));
    println!("Upload to Drive:      {}", on_off(out.report.upload_to_drive));
    println!("Description workers:  {}", out.report.description_workers);
    println!("yt-dlp:               {}", found(out.yt_dlp));
    println!("ffmpeg:               {}", found(out.ffmpeg));
    Ok(())
}

fn on_off(b: bool) -> &'static str {
    if b {
        "on"
    } else {
        "off"
    }
}

fn found(b: bool) -> &'static str {
    if b {
        "found"
    } else {
        "not found"
    }
}
