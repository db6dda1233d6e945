//! BIP-32 key hierarchy
//!
//! [`MasterKey`] is the wallet root, [`AccountKey`] a node accounts hang
//! their leaves from. [`KeyNode`] folds the private/public split into one
//! type so derivation call sites do not care which side they are on.

use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, Xpriv, Xpub};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, Network, NetworkKind};
use thiserror::Error;

use crate::hdpath::{HdPath, Subchain};

#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("hardened derivation requires a private key")]
    PrivateKeyRequired,

    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    #[error("bip32: {0}")]
    Bip32(#[from] bitcoin::bip32::Error),
}

/// A node in the key tree, on either side of the private/public divide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyNode {
    Private(Xpriv),
    Public(Xpub),
}

impl KeyNode {
    /// Parse a base58 extended key, private or public.
    pub fn from_hwif(s: &str) -> Result<Self, HierarchyError> {
        if let Ok(xpriv) = Xpriv::from_str(s) {
            return Ok(KeyNode::Private(xpriv));
        }
        Ok(KeyNode::Public(Xpub::from_str(s)?))
    }

    /// Derive the node at `path` below this one.
    ///
    /// Deterministic: the same node and path always produce the same
    /// child. A hardened segment under a public node fails with
    /// [`HierarchyError::PrivateKeyRequired`].
    pub fn derive(&self, path: &HdPath) -> Result<KeyNode, HierarchyError> {
        let secp = Secp256k1::new();
        match self {
            KeyNode::Private(xpriv) => Ok(KeyNode::Private(xpriv.derive_priv(&secp, path)?)),
            KeyNode::Public(xpub) => {
                if path.is_hardened() {
                    return Err(HierarchyError::PrivateKeyRequired);
                }
                Ok(KeyNode::Public(xpub.derive_pub(&secp, path)?))
            }
        }
    }

    /// The public half of this node.
    pub fn public(&self) -> Xpub {
        match self {
            KeyNode::Private(xpriv) => {
                let secp = Secp256k1::new();
                Xpub::from_priv(&secp, xpriv)
            }
            KeyNode::Public(xpub) => *xpub,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, KeyNode::Private(_))
    }

    pub fn xpriv(&self) -> Option<&Xpriv> {
        match self {
            KeyNode::Private(xpriv) => Some(xpriv),
            KeyNode::Public(_) => None,
        }
    }

    /// Base58 string form; private nodes render the private key.
    pub fn to_hwif(&self) -> String {
        match self {
            KeyNode::Private(xpriv) => xpriv.to_string(),
            KeyNode::Public(xpub) => xpub.to_string(),
        }
    }
}

/// The full `Network` a base58 extended key can speak for. Base58 only
/// distinguishes mainnet from testnet, so testnet keys map to `Testnet`.
fn network_for(node: &KeyNode) -> Network {
    match node.public().network {
        NetworkKind::Main => Network::Bitcoin,
        NetworkKind::Test => Network::Testnet,
    }
}

/// The root of a wallet's key tree (m or M).
#[derive(Debug, Clone)]
pub struct MasterKey {
    node: KeyNode,
    network: Network,
}

impl MasterKey {
    /// Build the BIP-32 master node from raw seed bytes.
    pub fn from_seed(seed: &[u8], network: Network) -> Result<Self, HierarchyError> {
        let xpriv = Xpriv::new_master(network, seed)?;
        Ok(MasterKey {
            node: KeyNode::Private(xpriv),
            network,
        })
    }

    pub fn from_seed_hex(seed_hex: &str, network: Network) -> Result<Self, HierarchyError> {
        let seed =
            hex::decode(seed_hex).map_err(|e| HierarchyError::InvalidSeed(e.to_string()))?;
        Self::from_seed(&seed, network)
    }

    /// Parse a base58 extended key as a master node. Watch-only masters
    /// are accepted; their hardened account constructors will then fail.
    pub fn from_hwif(s: &str) -> Result<Self, HierarchyError> {
        let node = KeyNode::from_hwif(s)?;
        let network = network_for(&node);
        Ok(MasterKey { node, network })
    }

    pub fn node(&self) -> &KeyNode {
        &self.node
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn to_hwif(&self) -> String {
        self.node.to_hwif()
    }

    /// Account node at an arbitrary path below the master.
    pub fn account_for_path(&self, path: &HdPath) -> Result<AccountKey, HierarchyError> {
        Ok(AccountKey::new(self.node.derive(path)?, self.network))
    }

    /// BIP-32 style account `nH`.
    pub fn bip32_account(&self, n: u32) -> Result<AccountKey, HierarchyError> {
        self.account_for_path(&hardened_path(&[n])?)
    }

    /// BIP-44 style account `purposeH/coinH/nH`.
    pub fn bip44_account(&self, purpose: u32, coin: u32, n: u32) -> Result<AccountKey, HierarchyError> {
        self.account_for_path(&hardened_path(&[purpose, coin, n])?)
    }

    /// Electrum style account `0H/n`.
    pub fn electrum_account(&self, n: u32) -> Result<AccountKey, HierarchyError> {
        let mut path = hardened_path(&[0])?;
        let child = ChildNumber::from_normal_idx(n)
            .map_err(|_| HierarchyError::InvalidPath(format!("0H/{n}")))?;
        path.push(child);
        self.account_for_path(&path)
    }

    /// This master used directly as an account node, the layout of
    /// keychains that derive leaves straight below the root.
    pub fn as_account(&self) -> AccountKey {
        AccountKey::new(self.node, self.network)
    }
}

fn hardened_path(indices: &[u32]) -> Result<HdPath, HierarchyError> {
    let mut path = HdPath::root();
    for &index in indices {
        let child = ChildNumber::from_hardened_idx(index)
            .map_err(|_| HierarchyError::InvalidPath(format!("{index}H")))?;
        path.push(child);
    }
    Ok(path)
}

/// An account-level node leaf keys hang from.
#[derive(Debug, Clone)]
pub struct AccountKey {
    node: KeyNode,
    network: Network,
}

impl AccountKey {
    pub fn new(node: KeyNode, network: Network) -> Self {
        AccountKey { node, network }
    }

    pub fn from_hwif(s: &str) -> Result<Self, HierarchyError> {
        let node = KeyNode::from_hwif(s)?;
        let network = network_for(&node);
        Ok(AccountKey { node, network })
    }

    pub fn node(&self) -> &KeyNode {
        &self.node
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn is_private(&self) -> bool {
        self.node.is_private()
    }

    pub fn to_hwif(&self) -> String {
        self.node.to_hwif()
    }

    /// Base58 xpub string, regardless of which side this key is on.
    pub fn public_hwif(&self) -> String {
        self.node.public().to_string()
    }

    /// Leaf node `<subchain>/<n>`.
    pub fn leaf(&self, subchain: Subchain, n: u32) -> Result<KeyNode, HierarchyError> {
        self.leaf_for_path(&HdPath::leaf(subchain, n)?)
    }

    pub fn leaf_for_path(&self, path: &HdPath) -> Result<KeyNode, HierarchyError> {
        self.node.derive(path)
    }

    /// P2PKH address of the leaf at `path`, for single-key accounts.
    pub fn address_for_path(&self, path: &HdPath) -> Result<Address, HierarchyError> {
        let leaf = self.leaf_for_path(path)?;
        Ok(Address::p2pkh(leaf.public().to_pub(), self.network))
    }
}
