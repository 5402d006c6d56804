//! Secret handling for operator credentials.

pub mod credentials;

pub use credentials::{AdminKey, SecretString};
