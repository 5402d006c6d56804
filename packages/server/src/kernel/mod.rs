// Background work that runs beside the HTTP server
pub mod scheduled_tasks;

pub use scheduled_tasks::*;
