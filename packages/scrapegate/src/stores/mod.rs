//! Storage implementations for the gateway ledgers.
//!
//! Available backends:
//! - `MemoryStore` - In-memory storage (tests and development)
//! - `JsonFileStore` - JSON and JSON Lines files in a data directory

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
