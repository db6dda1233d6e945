//! Covault Accounts
//!
//! Single-key and m-of-n multisig accounts over the covault-core key
//! hierarchy: address issue and lookup, spendable selection, payment
//! assembly and local signing.
//!
//! # Spend pipeline
//!
//! ```text
//! addresses -> provider spendables -> select inputs -> fee/change -> sign
//! ```
//!
//! Multisig signing fills the slots this device cannot sign with a fixed
//! placeholder signature. The co-signing service receives placeholders as
//! `OP_0` and substitutes its own signatures.

pub mod account;
pub mod builder;
pub mod participants;
pub mod provider;
pub mod script;

pub use account::{Account, MultisigAccount, SimpleAccount, DEFAULT_LOOKAHEAD};
pub use builder::{AccountTransaction, FeeModel, Payable, DUST_THRESHOLD};
pub use participants::ParticipantKeySet;
pub use provider::{ProviderError, Spendable, SpendableProvider, TxLookup};
pub use script::{dummy_signature, KeyOrdering, MultisigScriptBuilder};

use bitcoin::Amount;
use thiserror::Error;

use covault_core::{CacheError, HierarchyError};

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("account is not complete")]
    IncompleteAccount,

    #[error("account is already complete")]
    AlreadyComplete,

    #[error("insufficient balance: {} sat available", .available.to_sat())]
    InsufficientBalance { available: Amount },

    #[error("unknown address {0}")]
    UnknownAddress(String),

    #[error("bad quorum: {required} of {total}")]
    BadQuorum { required: usize, total: usize },

    #[error("no private key held for this account")]
    NoPrivateKey,

    #[error("path annotations do not match transaction shape")]
    PathMismatch,

    #[error("script: {0}")]
    Script(String),

    #[error("sighash: {0}")]
    Sighash(String),

    #[error("hierarchy: {0}")]
    Hierarchy(#[from] HierarchyError),

    #[error("cache: {0}")]
    Cache(#[from] CacheError),

    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
}
