pub mod config;
pub mod explorer;
pub mod observability;
pub mod store;
pub mod types;
