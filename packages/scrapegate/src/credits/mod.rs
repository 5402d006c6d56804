//! Credit accounting.

pub mod ledger;

pub use ledger::{
    token_prefix, Consumed, CreditAccount, CreditLedger, CreditLedgerStats, CreditReceipt,
};
