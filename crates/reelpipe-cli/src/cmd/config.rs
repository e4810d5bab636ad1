use crate::output::print_json;
use crate::project::Project;
use anyhow::Context;
use clap::Subcommand;
use reelpipe_core::config::{Config, WarnLevel};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Write a starter reelpipe.yaml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective config (file plus env overrides)
    Show,

    /// Validate the config for missing keys and common mistakes
    Validate,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, config_path: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Init { force } => init(config_path, force, json),
        ConfigSubcommand::Show => show(root, config_path, json),
        ConfigSubcommand::Validate => validate(root, config_path, json),
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(config_path: &Path, force: bool, json: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    Config::template()
        .save(config_path)
        .with_context(|| format!("writing {}", config_path.display()))?;

    if json {
        return print_json(&serde_json::json!({ "path": config_path }));
    }
    println!("Wrote {}", config_path.display());
    println!("Set sheets.spreadsheet_id and sources.instagram_urls before running.");
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, config_path: &Path, json: bool) -> anyhow::Result<()> {
    let project = Project::load(root, config_path)?;
    if json {
        return print_json(&project.config);
    }
    let yaml = serde_yaml::to_string(&project.config).context("serializing config")?;
    println!("# {}", project.config_path.display());
    print!("{yaml}");
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, config_path: &Path, json: bool) -> anyhow::Result<()> {
    let project = Project::load(root, config_path).context("failed to load config")?;
    let warnings = project.config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
