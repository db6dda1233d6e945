//! Chain data providers
//!
//! Accounts pull unspent outputs and previous transactions through these
//! traits, so tests run against in-memory fixtures and production plugs
//! in an Electrum backend.

use std::collections::HashMap;

use bitcoin::{Address, Amount, OutPoint, Transaction, Txid};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// An unspent output the provider attributes to one of our addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spendable {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub address: Address,
}

impl Spendable {
    pub fn new(outpoint: OutPoint, value: Amount, address: Address) -> Self {
        Spendable {
            outpoint,
            value,
            address,
        }
    }
}

/// Source of unspent outputs for a set of addresses.
pub trait SpendableProvider {
    /// Unspent outputs paying the given address.
    fn spendables_for_address(&self, address: &Address) -> Result<Vec<Spendable>, ProviderError>;

    /// Unspent outputs for a batch of addresses, concatenated in address
    /// order so selection sees a deterministic sequence. Backends with a
    /// batch call can override this.
    fn spendables_for_addresses(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<Spendable>, ProviderError> {
        let mut all = Vec::new();
        for address in addresses {
            all.extend(self.spendables_for_address(address)?);
        }
        Ok(all)
    }
}

/// Lookup of previous transactions by id, needed when assembling a
/// co-signing request.
pub trait TxLookup {
    fn lookup(&self, txid: &Txid) -> Result<Option<Transaction>, ProviderError>;
}

impl TxLookup for HashMap<Txid, Transaction> {
    fn lookup(&self, txid: &Txid) -> Result<Option<Transaction>, ProviderError> {
        Ok(self.get(txid).cloned())
    }
}
