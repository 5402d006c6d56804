// HTTP routes
pub mod admin;
pub mod credits;
pub mod health;
pub mod scrape;

pub use admin::*;
pub use credits::*;
pub use health::*;
pub use scrape::*;
