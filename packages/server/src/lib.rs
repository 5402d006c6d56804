// Scrapegate HTTP server library
pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
