//! Covault Oracle Client
//!
//! Client for a remote co-signing service holding one key of an m-of-n
//! account. The service identifies a keychain by a version-5 UUID over
//! the account's first public key, answers key fetches and creations
//! under `/keychains/{id}`, and co-signs transactions posted to
//! `/keychains/{id}/transactions`.
//!
//! # Protocol outcomes
//!
//! Every call resolves to exactly one of: a success payload, a business
//! rejection carrying the raw response body ([`OracleError::Rejected`],
//! or [`OracleError::AlreadyExists`] on creation), or a protocol error
//! for anything outside the wire contract ([`OracleError::Protocol`],
//! timeouts included). Protocol errors are never retried here; a cosign
//! retry must reuse the original spend id, which is the caller's call.

pub mod client;
pub mod request;
pub mod wire;

pub use client::{CosignOutcome, CreateOptions, Oracle, OracleClient, OracleConfig, DEFAULT_ENDPOINT};
pub use request::{cosign_request, strip_dummy_signatures};
pub use wire::{
    ContactInfo, CosignRequest, CosignTransaction, Deferral, KeychainRequest, OracleResponse,
    PolicyLevel, PolicyParameters,
};

use bitcoin::Txid;
use thiserror::Error;
use uuid::Uuid;

use covault_account::{AccountError, ProviderError};

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("keychain already exists")]
    AlreadyExists,

    #[error("rejected by oracle: {0}")]
    Rejected(String),

    #[error("oracle protocol error: {0}")]
    Protocol(String),

    #[error("previous transaction {0} not found")]
    TransactionLookupFailed(Txid),

    #[error("account: {0}")]
    Account(#[from] AccountError),

    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        OracleError::Protocol(e.to_string())
    }
}

/// Stable identity of an account's remote keychain: the version-5 UUID
/// of `urn:digitaloracle.co:<first public key>` in the URL namespace.
/// This is the only lookup key the service has, so it must reproduce
/// bit-for-bit forever.
pub fn account_id(first_public_key: &str) -> Uuid {
    let name = format!("urn:digitaloracle.co:{first_public_key}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
}

/// Fresh disambiguation id for a logical payment. Reuse the same id when
/// retrying a cosign call, never a fresh one.
pub fn new_spend_id() -> String {
    Uuid::new_v4().to_string()
}
