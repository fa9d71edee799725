pub mod api;
pub mod config;
pub mod db;
pub mod metrics;
pub mod progress;

pub mod error;
pub mod logger;
pub mod time;
