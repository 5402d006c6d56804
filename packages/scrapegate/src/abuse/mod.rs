//! Abuse protection: severity rules, incident ledger and rate limiting.

pub mod ledger;
pub mod rate_limiter;
pub mod severity;

pub use ledger::{AbuseIncident, AbuseLedger, AbuseStats, AuditEntry, RequestMeta};
pub use rate_limiter::{
    Admission, BanRecord, BanState, CompactionReport, DenialKind, RateLimiter, RateLimiterStats,
};
pub use severity::{classify_severity, Severity};
