mod cmd;
mod output;
mod project;
mod root;

use clap::{Parser, Subcommand};
use cmd::{caption::CaptionSubcommand, config::ConfigSubcommand, sheet::SheetSubcommand};
use project::ScrapeOverrides;
use reelpipe_core::config::Config;
use reelpipe_core::PipelineError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "reelpipe",
    about = "Collect Instagram reels into a Google Sheet, download and hand them off to n8n",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: nearest directory with reelpipe.yaml)
    #[arg(long, global = true, env = "REELPIPE_ROOT")]
    root: Option<PathBuf>,

    /// Config file (default: <root>/reelpipe.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Headless browser with shorter scroll delays
    #[arg(long, global = true)]
    fast: bool,

    /// Only collect reels posted within N days
    #[arg(long, global = true, value_name = "N")]
    days: Option<u32>,

    /// Stop after N new links across all profiles (0 = unlimited)
    #[arg(long, global = true, value_name = "N")]
    limit: Option<u32>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill missing descriptions for pending rows
    Descriptions,

    /// Download pending reels and upload them to Google Drive
    Uploads,

    /// Descriptions and uploads, without scraping
    Processing,

    /// Scrape, then descriptions and uploads
    Full,

    /// Row counts per status, toggles and tool availability
    Status,

    /// Set the status of one reel
    Mark {
        /// Reel ID (shortcode) as stored in the sheet
        reel_id: String,
        /// pending, processing, completed or failed
        status: String,
        /// YouTube posting date to record
        #[arg(long)]
        posted_date: Option<String>,
        /// YouTube Shorts video id to record
        #[arg(long)]
        shorts_id: Option<String>,
    },

    /// Worksheet maintenance
    Sheet {
        #[command(subcommand)]
        subcommand: SheetSubcommand,
    },

    /// Download one reel and POST it to an n8n resume webhook
    Notify {
        /// Reel URL
        #[arg(long)]
        url: String,
        /// Account category passed through to the workflow
        #[arg(long, default_value = "default")]
        account_type: String,
        /// Webhook to resume (default: webhook.url / REELPIPE_WEBHOOK_URL)
        #[arg(long)]
        resume_url: Option<String>,
    },

    /// Check AI caption JSON
    Caption {
        #[command(subcommand)]
        subcommand: CaptionSubcommand,
    },

    /// Manage reelpipe.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

impl Commands {
    fn runs_pipeline(command: Option<&Commands>) -> bool {
        matches!(
            command,
            None | Some(Commands::Descriptions)
                | Some(Commands::Uploads)
                | Some(Commands::Processing)
                | Some(Commands::Full)
                | Some(Commands::Notify { .. })
        )
    }
}

fn main() {
    let cli = Cli::parse();

    let root = root::resolve_root(cli.root.as_deref());
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| reelpipe_core::paths::config_path(&root));

    let default_level = if Commands::runs_pipeline(cli.command.as_ref()) {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    let configured_level = Config::load(&config_path)
        .ok()
        .and_then(|c| c.logging.level)
        .and_then(|l| l.parse::<tracing::Level>().ok());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(configured_level.unwrap_or(default_level).into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let overrides = ScrapeOverrides {
        fast: cli.fast,
        days: cli.days,
        limit: cli.limit,
    };
    let json = cli.json;

    let result = match cli.command {
        None => cmd::scrape::run(&root, &config_path, &overrides, json),
        Some(Commands::Descriptions) => cmd::descriptions::run(&root, &config_path, json),
        Some(Commands::Uploads) => cmd::uploads::run(&root, &config_path, json),
        Some(Commands::Processing) => cmd::processing::run(&root, &config_path, json),
        Some(Commands::Full) => cmd::full::run(&root, &config_path, &overrides, json),
        Some(Commands::Status) => cmd::status::run(&root, &config_path, json),
        Some(Commands::Mark {
            reel_id,
            status,
            posted_date,
            shorts_id,
        }) => cmd::mark::run(
            &root,
            &config_path,
            &reel_id,
            &status,
            posted_date.as_deref(),
            shorts_id.as_deref(),
            json,
        ),
        Some(Commands::Sheet { subcommand }) => cmd::sheet::run(&root, &config_path, subcommand, json),
        Some(Commands::Notify {
            url,
            account_type,
            resume_url,
        }) => cmd::notify::run(&root, &config_path, url, account_type, resume_url, json),
        Some(Commands::Caption { subcommand }) => cmd::caption::run(subcommand, json),
        Some(Commands::Config { subcommand }) => cmd::config::run(&root, &config_path, subcommand, json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        let hint = e
            .chain()
            .find_map(|c| c.downcast_ref::<PipelineError>())
            .and_then(PipelineError::hint);
        if let Some(hint) = hint {
            eprintln!("hint: {hint}");
        }
        std::process::exit(1);
    }
}
