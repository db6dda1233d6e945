//! Covault Core
//!
//! Key hierarchy and derivation cache for Covault accounts.
//!
//! # Key Hierarchy
//!
//! [`MasterKey`] wraps a BIP-32 root and hands out [`AccountKey`] nodes
//! (`nH`, `44H/coinH/nH`, Electrum-style `0H/n`). Both sides of the
//! private/public divide go through [`KeyNode`], so watch-only call sites
//! read the same as signing ones and hardened derivation from a public
//! node fails loudly instead of silently downgrading.
//!
//! # Derivation Cache
//!
//! [`DerivationCache`] remembers derived leaf public keys per path and how
//! many addresses each subchain has issued, and snapshots to JSON so a
//! wallet can resume without re-deriving. Private keys are never cached.

pub mod cache;
pub mod hdpath;
pub mod hierarchy;

pub use cache::{CacheError, CachedKey, DerivationCache, IssuedCounters};
pub use hdpath::{HdPath, Subchain};
pub use hierarchy::{AccountKey, HierarchyError, KeyNode, MasterKey};
