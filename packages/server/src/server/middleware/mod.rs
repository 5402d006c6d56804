// HTTP middleware
pub mod admin_auth;
pub mod ip_extractor;

pub use admin_auth::*;
pub use ip_extractor::*;
