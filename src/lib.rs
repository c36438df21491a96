pub mod config;
pub mod error;
pub mod files;
pub mod ingest;
pub mod model;
pub mod report;
pub mod server;
pub mod sheet;
pub mod store;
