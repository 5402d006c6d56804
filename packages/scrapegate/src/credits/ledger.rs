//! Prepaid credit accounts keyed by opaque access tokens.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CreditDenial;
use crate::types::config::CreditConfig;
use crate::types::tier::Tier;

const TOKEN_PREFIX: &str = "sg_";

/// A prepaid balance. `used_credits <= total_credits` between operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditAccount {
    pub token: String,
    pub tier: Tier,
    pub total_credits: u64,
    pub used_credits: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub payment_ref: String,
}

impl CreditAccount {
    pub fn remaining(&self) -> u64 {
        self.total_credits.saturating_sub(self.used_credits)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Proof of one successful consume.
///
/// Not `Clone`: refunding through a receipt moves it, so a single consume
/// can be returned at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct CreditReceipt {
    token: String,
    tier: Tier,
    cost: u64,
}

impl CreditReceipt {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }
}

/// Result of a successful consume.
#[derive(Debug)]
pub struct Consumed {
    pub remaining: u64,
    pub receipt: CreditReceipt,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditLedgerStats {
    pub credits_issued: u64,
    pub credits_consumed: u64,
    pub credits_refunded: u64,
    pub active_accounts: usize,
    pub expired_evicted: u64,
}

/// Credit ledger with atomic consume and refund.
///
/// Each account lives in its own `DashMap` entry; the balance check and the
/// increment of `used_credits` happen under that entry's write lock, so two
/// concurrent consumes against one token can never oversell.
pub struct CreditLedger {
    accounts: DashMap<String, CreditAccount>,
    config: CreditConfig,
    issued: AtomicU64,
    consumed: AtomicU64,
    refunded: AtomicU64,
    evicted: AtomicU64,
}

impl Default for CreditLedger {
    fn default() -> Self {
        Self::new(CreditConfig::default())
    }
}

impl CreditLedger {
    pub fn new(config: CreditConfig) -> Self {
        Self {
            accounts: DashMap::new(),
            config,
            issued: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            refunded: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Mint a token for a confirmed payment.
    pub fn issue(&self, payment_ref: &str, tier: Tier) -> String {
        self.issue_at(payment_ref, tier, Utc::now())
    }

    pub fn issue_at(&self, payment_ref: &str, tier: Tier, now: DateTime<Utc>) -> String {
        let token = mint_token(payment_ref);
        let account = CreditAccount {
            token: token.clone(),
            tier,
            total_credits: tier.credit_grant(),
            used_credits: 0,
            created_at: now,
            expires_at: now + self.config.account_lifetime(),
            payment_ref: payment_ref.to_string(),
        };

        info!(
            token_prefix = token_prefix(&token),
            tier = %tier,
            credits = account.total_credits,
            "Credit account issued"
        );

        self.issued.fetch_add(account.total_credits, Ordering::Relaxed);
        self.accounts.insert(token.clone(), account);
        token
    }

    /// Charge one scrape at `tier`'s cost.
    pub fn consume(&self, token: &str, tier: Tier) -> Result<Consumed, CreditDenial> {
        self.consume_at(token, tier, Utc::now())
    }

    pub fn consume_at(
        &self,
        token: &str,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<Consumed, CreditDenial> {
        let cost = tier.cost();

        let result = {
            let Some(mut account) = self.accounts.get_mut(token) else {
                return Err(CreditDenial::InvalidToken);
            };

            if account.is_expired_at(now) {
                Err(CreditDenial::Expired)
            } else if account.remaining() < cost {
                Err(CreditDenial::InsufficientCredits {
                    remaining: account.remaining(),
                })
            } else {
                account.used_credits += cost;
                Ok(account.remaining())
            }
        };

        match result {
            Ok(remaining) => {
                self.consumed.fetch_add(cost, Ordering::Relaxed);
                debug!(token_prefix = token_prefix(token), cost, remaining, "Credit consumed");
                Ok(Consumed {
                    remaining,
                    receipt: CreditReceipt {
                        token: token.to_string(),
                        tier,
                        cost,
                    },
                })
            }
            Err(CreditDenial::Expired) => {
                self.evict_if_expired(token, now);
                Err(CreditDenial::Expired)
            }
            Err(denial) => Err(denial),
        }
    }

    /// Return one scrape's cost to the account, floored at zero used.
    ///
    /// Returns false when the account no longer exists.
    pub fn refund(&self, token: &str, tier: Tier) -> bool {
        let cost = tier.cost();
        let Some(mut account) = self.accounts.get_mut(token) else {
            warn!(token_prefix = token_prefix(token), "Refund for unknown account");
            return false;
        };

        let returned = cost.min(account.used_credits);
        account.used_credits -= returned;
        self.refunded.fetch_add(returned, Ordering::Relaxed);
        debug!(
            token_prefix = token_prefix(token),
            returned,
            remaining = account.remaining(),
            "Credit refunded"
        );
        true
    }

    /// Refund exactly the consume that produced `receipt`.
    pub fn refund_receipt(&self, receipt: CreditReceipt) -> bool {
        self.refund(&receipt.token, receipt.tier)
    }

    /// Snapshot of an account; expired accounts are evicted and reported missing.
    pub fn balance(&self, token: &str) -> Option<CreditAccount> {
        self.balance_at(token, Utc::now())
    }

    pub fn balance_at(&self, token: &str, now: DateTime<Utc>) -> Option<CreditAccount> {
        let account = self.accounts.get(token).map(|a| a.clone())?;
        if account.is_expired_at(now) {
            self.evict_if_expired(token, now);
            return None;
        }
        Some(account)
    }

    /// Remaining credits, zero for unknown or expired tokens.
    pub fn remaining(&self, token: &str) -> u64 {
        self.balance(token).map(|a| a.remaining()).unwrap_or(0)
    }

    /// Remove every account past its expiry. Returns how many were removed.
    pub fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.accounts.len();
        self.accounts.retain(|_, account| !account.is_expired_at(now));
        let evicted = before.saturating_sub(self.accounts.len());
        if evicted > 0 {
            self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            info!(evicted, "Expired credit accounts evicted");
        }
        evicted
    }

    pub fn stats(&self) -> CreditLedgerStats {
        CreditLedgerStats {
            credits_issued: self.issued.load(Ordering::Relaxed),
            credits_consumed: self.consumed.load(Ordering::Relaxed),
            credits_refunded: self.refunded.load(Ordering::Relaxed),
            active_accounts: self.accounts.len(),
            expired_evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    fn evict_if_expired(&self, token: &str, now: DateTime<Utc>) {
        if self
            .accounts
            .remove_if(token, |_, account| account.is_expired_at(now))
            .is_some()
        {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            info!(token_prefix = token_prefix(token), "Expired credit account evicted");
        }
    }
}

fn mint_token(payment_ref: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(payment_ref.as_bytes());
    format!("{TOKEN_PREFIX}{:x}", hasher.finalize())
}

/// First eight characters of a token, safe to log.
pub fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(8) {
        Some((end, _)) => &token[..end],
        None => token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_token_prefix_never_logs_whole_multibyte_token() {
        let token = "tökén_ünïcödé_sécrét_välüé";
        let prefix = token_prefix(token);
        assert_eq!(prefix, "tökén_ün");
        assert_eq!(prefix.chars().count(), 8);

        assert_eq!(token_prefix("sg_0123456789abcdef"), "sg_01234");
        assert_eq!(token_prefix("short"), "short");
        assert_eq!(token_prefix("日本語のトークン秘密"), "日本語のトークン");
    }

    #[test]
    fn test_basic_tier_allows_exactly_ten() {
        let ledger = CreditLedger::default();
        let token = ledger.issue("pay_1", Tier::Basic);

        for expected in (0..10).rev() {
            let consumed = ledger.consume(&token, Tier::Basic).unwrap();
            assert_eq!(consumed.remaining, expected);
        }

        let denial = ledger.consume(&token, Tier::Basic).unwrap_err();
        assert_eq!(denial, CreditDenial::InsufficientCredits { remaining: 0 });
    }

    #[test]
    fn test_unknown_token() {
        let ledger = CreditLedger::default();
        assert_eq!(
            ledger.consume("sg_nope", Tier::Basic).unwrap_err(),
            CreditDenial::InvalidToken
        );
        assert!(ledger.balance("sg_nope").is_none());
    }

    #[test]
    fn test_tokens_are_unique_and_opaque() {
        let ledger = CreditLedger::default();
        let a = ledger.issue("same_ref", Tier::Basic);
        let b = ledger.issue("same_ref", Tier::Basic);

        assert_ne!(a, b);
        assert!(a.starts_with(TOKEN_PREFIX));
        assert!(!a.contains("same_ref"));
    }

    #[test]
    fn test_expired_account_is_evicted() {
        let ledger = CreditLedger::default();
        let issued = Utc::now();
        let token = ledger.issue_at("pay_2", Tier::Premium, issued);

        let later = issued + chrono::Duration::days(31);
        assert_eq!(
            ledger.consume_at(&token, Tier::Premium, later).unwrap_err(),
            CreditDenial::Expired
        );
        assert_eq!(
            ledger.consume_at(&token, Tier::Premium, later).unwrap_err(),
            CreditDenial::InvalidToken
        );
        assert_eq!(ledger.stats().expired_evicted, 1);
    }

    #[test]
    fn test_receipt_refund_restores_balance() {
        let ledger = CreditLedger::default();
        let token = ledger.issue("pay_3", Tier::Premium);

        let consumed = ledger.consume(&token, Tier::Premium).unwrap();
        assert_eq!(consumed.remaining, 98);
        assert_eq!(consumed.receipt.cost(), 2);

        assert!(ledger.refund_receipt(consumed.receipt));
        assert_eq!(ledger.remaining(&token), 100);
    }

    #[test]
    fn test_refund_floors_at_zero() {
        let ledger = CreditLedger::default();
        let token = ledger.issue("pay_4", Tier::Custom);

        assert!(ledger.refund(&token, Tier::Custom));
        let account = ledger.balance(&token).unwrap();
        assert_eq!(account.used_credits, 0);
        assert_eq!(ledger.stats().credits_refunded, 0);
    }

    #[test]
    fn test_evict_expired_sweep() {
        let ledger = CreditLedger::default();
        let now = Utc::now();
        ledger.issue_at("old", Tier::Basic, now - chrono::Duration::days(40));
        ledger.issue_at("new", Tier::Basic, now);

        assert_eq!(ledger.evict_expired_at(now), 1);
        assert_eq!(ledger.stats().active_accounts, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumes_never_oversell() {
        let ledger = Arc::new(CreditLedger::default());
        let token = ledger.issue("pay_race", Tier::Basic);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let ledger = ledger.clone();
                let token = token.clone();
                tokio::spawn(async move { ledger.consume(&token, Tier::Basic).is_ok() })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 10);
        let account = ledger.balance(&token).unwrap();
        assert_eq!(account.used_credits, account.total_credits);
    }
}
