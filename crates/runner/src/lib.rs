pub mod config;
pub mod error;
pub mod executor;
pub mod language;
pub mod lock;
pub mod server;
pub mod types;
