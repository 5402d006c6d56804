//! Core trait abstractions for the gateway.
//!
//! These traits define the seams to external collaborators: the page
//! renderer, the outbound robots.txt fetcher, and persistent storage.

pub mod renderer;
pub mod robots;
pub mod store;
