pub mod auth;
pub mod backup;
pub mod browser;
pub mod caption;
pub mod config;
pub mod drive;
pub mod error;
pub mod io;
pub mod paths;
pub mod pipeline;
pub mod reel;
pub mod retry;
pub mod scraper;
pub mod sheet;
pub mod sheets_api;
pub mod types;
pub mod webhook;
pub mod ytdlp;

pub use error::{PipelineError, Result};
