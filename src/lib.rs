pub mod analytics;
pub mod config;
pub mod error;
pub mod query;
pub mod record;
pub mod search;
pub mod snapshot;
pub mod source;
pub mod types;
