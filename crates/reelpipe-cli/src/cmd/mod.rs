pub mod caption;
pub mod config;
pub mod descriptions;
pub mod full;
pub mod mark;
pub mod notify;
pub mod processing;
pub mod scrape;
pub mod sheet;
pub mod status;
pub mod uploads;
