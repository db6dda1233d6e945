//! Covault Electrum Provider
//!
//! Chain data for accounts via the Electrum protocol: unspent output
//! discovery behind [`SpendableProvider`], previous-transaction lookup
//! behind [`TxLookup`], block height, balances and broadcasting.
//!
//! # Security
//!
//! - Always use SSL/TLS connections (ssl:// or tcp+tls://)
//! - Validate all data received from server
//! - Never send private keys over the wire
//!
//! # Example
//!
//! ```ignore
//! use covault_electrum::{default_server, ElectrumProvider};
//! use bitcoin::Network;
//!
//! let provider = ElectrumProvider::new(default_server(Network::Bitcoin), Network::Bitcoin)?;
//! let balance = account.balance(&provider)?;
//! ```

use bitcoin::{Address, Amount, Network, OutPoint, Transaction, Txid};
use electrum_client::{ElectrumApi, Error as ElectrumError, ListUnspentRes};
use thiserror::Error;

use covault_account::{ProviderError, Spendable, SpendableProvider, TxLookup};

// Re-export the raw client for direct usage
pub use electrum_client::Client as RawClient;

/// Errors from Electrum operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("electrum protocol error: {0}")]
    Protocol(#[from] ElectrumError),

    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
}

/// Electrum-backed chain data provider
pub struct ElectrumProvider {
    client: electrum_client::Client,
    network: Network,
}

impl ElectrumProvider {
    /// Connect to an Electrum server
    ///
    /// # Arguments
    /// * `url` - Electrum server URL (e.g., "ssl://electrum.blockstream.info:60002")
    /// * `network` - Bitcoin network (Mainnet, Testnet, Signet, Regtest)
    ///
    /// # Security
    /// Always use SSL URLs in production. Plaintext connections can be MITM'd.
    pub fn new(url: &str, network: Network) -> Result<Self, Error> {
        if !url.starts_with("ssl://") && !url.contains("tls") {
            log::warn!("Connecting to Electrum without SSL - insecure for mainnet!");
        }

        let client = electrum_client::Client::new(url)
            .map_err(|e: ElectrumError| Error::Connection(e.to_string()))?;

        Ok(Self { client, network })
    }

    /// Get current blockchain height
    pub fn get_height(&self) -> Result<u32, Error> {
        let header = self.client.block_headers_subscribe()?;
        Ok(header.height as u32)
    }

    /// Broadcast a signed transaction
    ///
    /// # Returns
    /// The txid of the broadcast transaction
    pub fn broadcast(&self, tx: &Transaction) -> Result<Txid, Error> {
        self.client
            .transaction_broadcast(tx)
            .map_err(|e: ElectrumError| Error::BroadcastFailed(e.to_string()))
    }

    /// Get the total balance of a single address
    pub fn get_balance(&self, address: &Address) -> Result<Amount, Error> {
        let balance = self.client.script_get_balance(&address.script_pubkey())?;
        // Unconfirmed can be negative (pending spends), so clamp at zero
        let total = balance.confirmed as i64 + balance.unconfirmed;
        Ok(Amount::from_sat(total.max(0) as u64))
    }

    /// Get the network this provider is configured for
    pub fn network(&self) -> Network {
        self.network
    }
}

fn to_spendable(unspent: ListUnspentRes, address: &Address) -> Spendable {
    Spendable::new(
        OutPoint {
            txid: unspent.tx_hash,
            vout: unspent.tx_pos as u32,
        },
        Amount::from_sat(unspent.value),
        address.clone(),
    )
}

fn provider_error(e: ElectrumError) -> ProviderError {
    ProviderError::Unavailable(e.to_string())
}

impl SpendableProvider for ElectrumProvider {
    fn spendables_for_address(&self, address: &Address) -> Result<Vec<Spendable>, ProviderError> {
        let unspent = self
            .client
            .script_list_unspent(&address.script_pubkey())
            .map_err(provider_error)?;
        Ok(unspent
            .into_iter()
            .map(|u| to_spendable(u, address))
            .collect())
    }

    /// One batched round trip; results come back grouped per script, so
    /// flattening in address order keeps the merge deterministic.
    fn spendables_for_addresses(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<Spendable>, ProviderError> {
        let scripts: Vec<_> = addresses.iter().map(|a| a.script_pubkey()).collect();
        let per_script = self
            .client
            .batch_script_list_unspent(scripts.iter().map(|s| s.as_script()))
            .map_err(provider_error)?;

        let mut all = Vec::new();
        for (address, unspent) in addresses.iter().zip(per_script) {
            all.extend(unspent.into_iter().map(|u| to_spendable(u, address)));
        }
        Ok(all)
    }
}

impl TxLookup for ElectrumProvider {
    /// The Electrum protocol cannot distinguish an unknown transaction
    /// from a failed call, so misses surface as lookup errors rather
    /// than `Ok(None)`.
    fn lookup(&self, txid: &Txid) -> Result<Option<Transaction>, ProviderError> {
        match self.client.transaction_get(txid) {
            Ok(tx) => Ok(Some(tx)),
            Err(e) => Err(ProviderError::Lookup(format!("{txid}: {e}"))),
        }
    }
}

/// Default Electrum servers for each network
pub fn default_server(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "ssl://electrum.blockstream.info:60002",
        Network::Testnet => "ssl://electrum.blockstream.info:60004",
        Network::Signet => "ssl://mempool.space:60602",
        Network::Regtest => "tcp://127.0.0.1:60401",
        _ => "ssl://electrum.blockstream.info:60002",
    }
}
