//! Admission gateway: the fixed pipeline every scrape request runs through.
//!
//! ```text
//! ban -> input -> rate -> legality -> credit -> extract -> settle
//! ```
//!
//! Each step short-circuits on denial. Extraction and settlement run in a
//! spawned task so that a caller disconnecting mid-render still gets its
//! credit refunded. Redirects reported by the renderer are followed only
//! after the next hop passes the legality gate again.

pub mod admin;
pub mod maintenance;

use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub use admin::{GatewayStats, RestoreReport};
pub use maintenance::MaintenanceReport;

use crate::abuse::ledger::{AbuseLedger, RequestMeta};
use crate::abuse::rate_limiter::{BanState, DenialKind, RateLimiter};
use crate::credits::ledger::{token_prefix, CreditLedger, CreditReceipt};
use crate::error::{GatewayError, RenderError};
use crate::legality::{normalize_domain, LegalityGate};
use crate::traits::renderer::Extractor;
use crate::traits::robots::RobotsFetcher;
use crate::traits::store::LedgerStore;
use crate::types::config::GatewayConfig;
use crate::types::options::ExtractionOptions;
use crate::types::record::{ExtractedPage, ScrapeOutcome};
use crate::types::request::{
    CreditStatus, CreditSummary, Disposition, RequestStage, ScrapeRequest, ScrapeResponse,
};
use crate::types::tier::Tier;

/// Redirect hops followed for one request.
pub const MAX_REDIRECTS: usize = 5;

struct GatewayInner {
    config: GatewayConfig,
    legality: LegalityGate,
    limiter: RateLimiter,
    abuse: Arc<AbuseLedger>,
    credits: CreditLedger,
    extractor: Arc<dyn Extractor>,
}

/// Orchestrates legality, rate limiting, credits and extraction.
///
/// Owns no request state of its own. Cloning is cheap and shares all ledgers.
#[derive(Clone)]
pub struct AdmissionGateway {
    inner: Arc<GatewayInner>,
}

/// Builder for [`AdmissionGateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    extractor: Arc<dyn Extractor>,
    robots: Arc<dyn RobotsFetcher>,
    store: Option<Arc<dyn LedgerStore>>,
}

impl GatewayBuilder {
    /// Persist blacklist, incidents and audit entries to `store`.
    pub fn with_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> AdmissionGateway {
        let mut abuse = AbuseLedger::new(self.config.abuse.clone());
        let mut legality = LegalityGate::new(&self.config.legality, self.robots);
        if let Some(store) = self.store {
            abuse = abuse.with_store(store.clone());
            legality = legality.with_store(store);
        }

        let abuse = Arc::new(abuse);
        let limiter = RateLimiter::new(self.config.rate_limit.clone(), abuse.clone());
        let credits = CreditLedger::new(self.config.credits.clone());

        AdmissionGateway {
            inner: Arc::new(GatewayInner {
                config: self.config,
                legality,
                limiter,
                abuse,
                credits,
                extractor: self.extractor,
            }),
        }
    }
}

/// What the settlement task needs once a credit is reserved.
struct Reservation {
    caller: String,
    url: String,
    domain: String,
    tier: Tier,
    options: ExtractionOptions,
    charge: PendingCharge,
    remaining: u64,
}

enum ChargeState {
    Reserved(CreditReceipt),
    Settled(CreditStatus),
}

/// A reserved credit that exactly one party settles.
///
/// Shared between the settlement task and the request future, so a task
/// that dies before settling still has its credit returned.
#[derive(Clone)]
struct PendingCharge(Arc<Mutex<ChargeState>>);

impl PendingCharge {
    fn new(receipt: CreditReceipt) -> Self {
        Self(Arc::new(Mutex::new(ChargeState::Reserved(receipt))))
    }

    /// Take the receipt and record `status` as final.
    ///
    /// Fails with the earlier status when the charge was already settled.
    fn claim(&self, status: CreditStatus) -> Result<CreditReceipt, CreditStatus> {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, ChargeState::Settled(status)) {
            ChargeState::Reserved(receipt) => Ok(receipt),
            ChargeState::Settled(earlier) => {
                *state = ChargeState::Settled(earlier);
                Err(earlier)
            }
        }
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

type Failure = (GatewayError, &'static str);

impl AdmissionGateway {
    pub fn builder(
        config: GatewayConfig,
        extractor: Arc<dyn Extractor>,
        robots: Arc<dyn RobotsFetcher>,
    ) -> GatewayBuilder {
        GatewayBuilder {
            config,
            extractor,
            robots,
            store: None,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn legality(&self) -> &LegalityGate {
        &self.inner.legality
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn abuse(&self) -> &AbuseLedger {
        &self.inner.abuse
    }

    pub fn credits(&self) -> &CreditLedger {
        &self.inner.credits
    }

    /// Run one scrape request through the full pipeline.
    ///
    /// Always returns a response; denials and failures are carried in it
    /// with their status class.
    pub async fn handle(&self, caller: &str, request: ScrapeRequest) -> ScrapeResponse {
        let inner = &self.inner;
        let ScrapeRequest {
            url,
            access_token,
            tier,
            options,
        } = request;

        debug!(caller, url = %url, tier = %tier, stage = ?RequestStage::Received, "Scrape request");

        // 1. Ban
        if let Some(record) = inner
            .limiter
            .ban_record(caller)
            .filter(|r| r.state == BanState::Banned)
        {
            warn!(caller, "Request from banned caller");
            let err = GatewayError::Banned {
                reason: record.reason,
            };
            return self.deny(Disposition::DeniedAtBan, &err, &access_token, tier);
        }

        // Input
        let options = match validate_input(&url, &access_token, options) {
            Ok(options) => options,
            Err(err) => {
                debug!(caller, error = %err, "Invalid scrape request");
                inner.limiter.record_denied(caller, None);
                return self.deny(Disposition::DeniedAtInput, &err, &access_token, tier);
            }
        };

        // 2. Rate
        let domain = rate_domain(&url);
        let admission = inner.limiter.admit(caller, &domain);
        if !admission.allowed {
            if admission.denial == Some(DenialKind::Banned) {
                let err = GatewayError::Banned {
                    reason: admission.reason,
                };
                return self.deny(Disposition::DeniedAtBan, &err, &access_token, tier);
            }

            warn!(caller, domain = %domain, reason = %admission.reason, "Rate limited");
            inner.limiter.record_failure(caller, &admission.reason).await;
            let err = GatewayError::RateLimited {
                reason: admission.reason,
                reset_time: admission.reset_time,
            };
            return self.deny(Disposition::DeniedAtRate, &err, &access_token, tier);
        }
        debug!(caller, domain = %domain, stage = ?RequestStage::RateChecked, "Rate admitted");

        // 3. Legality
        let decision = inner.legality.check_legality(&url).await;
        if !decision.allowed {
            warn!(caller, url = %url, reason = %decision.reason, "Legality denied");

            if let Some(entry) = &decision.blacklist_entry {
                inner
                    .abuse
                    .report(
                        caller,
                        format!("blacklisted domain attempt: {entry}"),
                        json!({ "url": url, "entry": entry }),
                    )
                    .await;
            }
            inner.limiter.record_failure(caller, &decision.reason).await;

            let err = GatewayError::LegalityDenied {
                reason: decision.reason,
            };
            return self.deny(Disposition::DeniedAtLegality, &err, &access_token, tier);
        }
        debug!(caller, stage = ?RequestStage::LegalityChecked, "Legality passed");

        // 4. Credit
        let consumed = match inner.credits.consume(&access_token, tier) {
            Ok(consumed) => consumed,
            Err(denial) => {
                debug!(
                    caller,
                    token_prefix = token_prefix(&access_token),
                    reason = %denial,
                    "Credit denied"
                );
                inner.limiter.record_denied(caller, Some(domain.as_str()));
                let err = GatewayError::InsufficientCredit {
                    reason: denial.to_string(),
                    remaining: denial.remaining(),
                };
                return ScrapeResponse::denied(
                    Disposition::DeniedAtCredit,
                    &err,
                    CreditSummary {
                        remaining: denial.remaining(),
                        tier,
                    },
                );
            }
        };
        debug!(
            caller,
            remaining = consumed.remaining,
            stage = ?RequestStage::CreditReserved,
            "Credit reserved"
        );

        // 5 + 6. Extract and settle, detached from this future
        let charge = PendingCharge::new(consumed.receipt);
        let reservation = Reservation {
            caller: caller.to_string(),
            url,
            domain: decision.domain.unwrap_or(domain),
            tier,
            options,
            charge: charge.clone(),
            remaining: consumed.remaining,
        };

        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();
        let gateway = self.clone();
        let settlement = tokio::spawn(async move { gateway.extract_and_settle(reservation, cancel).await });

        match settlement.await {
            Ok(response) => response,
            Err(e) => self.settle_abandoned(caller, &charge, e, &access_token, tier),
        }
    }

    /// Settle a reservation whose task died, refunding it unless the task
    /// already did.
    fn settle_abandoned(
        &self,
        caller: &str,
        charge: &PendingCharge,
        cause: JoinError,
        token: &str,
        tier: Tier,
    ) -> ScrapeResponse {
        error!(caller, error = %cause, "Settlement task failed");
        let err = GatewayError::Internal {
            reason: "settlement task failed".to_string(),
        };

        match charge.claim(CreditStatus::Refunded) {
            Ok(receipt) => {
                self.inner.credits.refund_receipt(receipt);
                ScrapeResponse::refunded(&err, self.credit_summary(token, tier))
            }
            Err(CreditStatus::Charged) => {
                let mut response = ScrapeResponse::denied(
                    Disposition::SettledSuccess,
                    &err,
                    self.credit_summary(token, tier),
                );
                response.credit_status = CreditStatus::Charged;
                response
            }
            Err(_) => ScrapeResponse::refunded(&err, self.credit_summary(token, tier)),
        }
    }

    /// Run the extractor in its own task; dropping the future aborts it.
    async fn render_once(
        &self,
        url: &str,
        options: &ExtractionOptions,
    ) -> Result<Result<ExtractedPage, RenderError>, JoinError> {
        let extractor = self.inner.extractor.clone();
        let url = url.to_string();
        let options = options.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move { extractor.extract(&url, &options).await }));
        (&mut task.0).await
    }

    /// Render `url`, following redirects whose targets pass the legality gate.
    async fn render_following(
        &self,
        caller: &str,
        url: &str,
        options: &ExtractionOptions,
    ) -> Result<ExtractedPage, Failure> {
        let mut target = url.to_string();
        let mut hops = 0;

        loop {
            let error = match self.render_once(&target, options).await {
                Ok(Ok(page)) => return Ok(page),
                Ok(Err(error)) => error,
                Err(e) => {
                    error!(url = %target, error = %e, "Extraction task panicked");
                    return Err((
                        GatewayError::Internal {
                            reason: "extraction task panicked".to_string(),
                        },
                        "panic",
                    ));
                }
            };

            let location = match error {
                RenderError::Redirected { location, .. } => location,
                other => {
                    let kind = other.kind();
                    return Err((GatewayError::ExtractionFailed { reason: other.to_string() }, kind));
                }
            };

            hops += 1;
            if hops > MAX_REDIRECTS {
                warn!(caller, url, hops, "Redirect limit reached");
                return Err((
                    GatewayError::ExtractionFailed {
                        reason: format!("more than {MAX_REDIRECTS} redirects from {url}"),
                    },
                    "redirect",
                ));
            }

            let decision = self.inner.legality.check_legality(&location).await;
            if !decision.allowed {
                warn!(caller, from = %target, to = %location, reason = %decision.reason, "Redirect denied");
                return Err((
                    GatewayError::LegalityDenied {
                        reason: format!("redirect to {location}: {}", decision.reason),
                    },
                    "redirect_denied",
                ));
            }

            debug!(caller, from = %target, to = %location, hops, "Following redirect");
            target = location;
        }
    }

    async fn extract_and_settle(
        &self,
        reservation: Reservation,
        cancel: CancellationToken,
    ) -> ScrapeResponse {
        let inner = &self.inner;
        let started = Instant::now();

        let result: Result<ExtractedPage, Failure> = tokio::select! {
            rendered = self.render_following(&reservation.caller, &reservation.url, &reservation.options) => rendered,
            _ = cancel.cancelled() => {
                let e = RenderError::Cancelled;
                Err((GatewayError::ExtractionFailed { reason: e.to_string() }, e.kind()))
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let Reservation {
            caller,
            url,
            domain,
            tier,
            charge,
            remaining,
            ..
        } = reservation;

        match result {
            Ok(page) => {
                debug!(caller = %caller, stage = ?RequestStage::Extracted, "Extraction succeeded");
                inner.limiter.record_success(&caller, &domain);

                let outcome = ScrapeOutcome::succeeded(page.record.record_count());
                inner
                    .abuse
                    .log_request(
                        RequestMeta {
                            caller,
                            url,
                            domain,
                            tier,
                            duration_ms,
                            bytes: page.metadata.bytes,
                            credit_status: CreditStatus::Charged,
                        },
                        &outcome,
                    )
                    .await;

                if let Ok(receipt) = charge.claim(CreditStatus::Charged) {
                    debug!(token_prefix = token_prefix(receipt.token()), "Credit charged");
                }
                debug!(stage = ?RequestStage::Settled, "Request settled");
                ScrapeResponse::success(page.record, page.metadata, CreditSummary { remaining, tier })
            }
            Err((err, kind)) => {
                warn!(caller = %caller, url = %url, error = %err, "Extraction failed, refunding");
                let mut token = None;
                if let Ok(receipt) = charge.claim(CreditStatus::Refunded) {
                    token = Some(receipt.token().to_string());
                    inner.credits.refund_receipt(receipt);
                }
                inner
                    .limiter
                    .record_failure(&caller, &format!("extraction failed: {kind}"))
                    .await;

                inner
                    .abuse
                    .log_request(
                        RequestMeta {
                            caller,
                            url,
                            domain,
                            tier,
                            duration_ms,
                            bytes: 0,
                            credit_status: CreditStatus::Refunded,
                        },
                        &ScrapeOutcome::failed(kind),
                    )
                    .await;

                let credits = match token {
                    Some(token) => self.credit_summary(&token, tier),
                    None => CreditSummary { remaining, tier },
                };
                ScrapeResponse::refunded(&err, credits)
            }
        }
    }

    fn deny(
        &self,
        disposition: Disposition,
        err: &GatewayError,
        token: &str,
        tier: Tier,
    ) -> ScrapeResponse {
        ScrapeResponse::denied(disposition, err, self.credit_summary(token, tier))
    }

    fn credit_summary(&self, token: &str, tier: Tier) -> CreditSummary {
        CreditSummary {
            remaining: self.inner.credits.remaining(token),
            tier,
        }
    }
}

fn validate_input(
    url: &str,
    access_token: &str,
    options: ExtractionOptions,
) -> Result<ExtractionOptions, GatewayError> {
    if url.trim().is_empty() {
        return Err(GatewayError::invalid_input("url is required"));
    }
    if access_token.trim().is_empty() {
        return Err(GatewayError::invalid_input("accessToken is required"));
    }
    options.validate()
}

/// Domain used for rate accounting, before the legality gate has parsed
/// the URL. Unparseable URLs count against the raw string.
fn rate_domain(url: &str) -> String {
    url::Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(normalize_domain))
        .unwrap_or_else(|| url.trim().to_string())
}
