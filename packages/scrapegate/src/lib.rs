//! Admission control for web extraction.
//!
//! Every scrape request passes a fixed pipeline before any page is fetched:
//! ban check, rate admission, legality (blacklist + robots.txt), and a credit
//! reservation. Extraction runs only after all four agree, and a failed
//! extraction always returns the reserved credit.
//!
//! # Usage
//!
//! ```rust,ignore
//! use scrapegate::{AdmissionGateway, ExtractionEngine, GatewayConfig, HttpRenderer, ScrapeRequest, Tier};
//! use scrapegate::legality::HttpRobotsFetcher;
//!
//! let config = GatewayConfig::default();
//! let engine = ExtractionEngine::new(HttpRenderer::new(&config.legality.user_agent)?);
//! let robots = HttpRobotsFetcher::new(&config.legality.user_agent, config.legality.robots_timeout())?;
//! let gateway = AdmissionGateway::builder(config, Arc::new(engine), Arc::new(robots)).build();
//!
//! let token = gateway.issue_credits("payment-123", Tier::Basic);
//! let response = gateway
//!     .handle("203.0.113.5", ScrapeRequest::new("https://example.com/", token, Tier::Basic))
//!     .await;
//! ```
//!
//! # Modules
//!
//! - [`legality`] - Blacklist, robots.txt cache and URL guard
//! - [`abuse`] - Rate limiter, ban escalation and incident ledger
//! - [`credits`] - Prepaid credit accounts
//! - [`gateway`] - The admission pipeline and admin operations
//! - [`engine`] - Page rendering and heuristic record extraction
//! - [`stores`] - Persistence backends for the ledgers
//! - [`testing`] - Mock implementations for testing

pub mod abuse;
pub mod credits;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod legality;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use abuse::{AbuseIncident, AbuseLedger, AuditEntry, BanState, RateLimiter, Severity};
pub use credits::{CreditAccount, CreditLedger, CreditReceipt};
pub use engine::{ExtractionEngine, HtmlExtractor, HttpRenderer};
pub use error::{CreditDenial, GatewayError, RenderError, StoreError};
pub use gateway::{AdmissionGateway, GatewayBuilder, GatewayStats, MaintenanceReport};
pub use legality::{LegalityDecision, LegalityGate};
pub use security::{AdminKey, SecretString};
pub use stores::{JsonFileStore, MemoryStore};
pub use traits::{
    renderer::{Extractor, Renderer},
    robots::{RobotsFetch, RobotsFetcher},
    store::{AuditStore, BlacklistStore, IncidentStore, LedgerStore},
};
pub use types::{
    config::{AbuseConfig, CreditConfig, GatewayConfig, LegalityConfig, RateLimitConfig},
    options::{ExtractionOptions, ExtractionType},
    record::{ExtractedPage, ExtractionMetadata, RecordItem, RenderedPage, ScrapeOutcome, ScrapedRecord},
    request::{CreditStatus, CreditSummary, Disposition, ErrorBody, ScrapeRequest, ScrapeResponse},
    tier::Tier,
};
