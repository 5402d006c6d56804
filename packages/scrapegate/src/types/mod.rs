//! Data types shared across the gateway and its ledgers.

pub mod config;
pub mod options;
pub mod record;
pub mod request;
pub mod tier;
