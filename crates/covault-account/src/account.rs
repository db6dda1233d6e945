//! Account state machines
//!
//! A single-key P2PKH account and an m-of-n P2SH multisig account over
//! the same shared state: the network, the derivation cache with its
//! issued-address counters, and the book mapping every generated address
//! back to its chain path. Both are wrapped by [`Account`] so callers
//! hold one type regardless of flavour.

use std::collections::HashMap;

use bitcoin::bip32::Xpub;
use bitcoin::blockdata::script::Builder;
use bitcoin::ecdsa::Signature as EcdsaSignature;
use bitcoin::hashes::Hash;
use bitcoin::sighash::SighashCache;
use bitcoin::{Address, Amount, CompressedPublicKey, EcdsaSighashType, Network, ScriptBuf, Transaction};
use secp256k1::{Message, Secp256k1};

use covault_core::{AccountKey, DerivationCache, HdPath, Subchain};

use crate::builder::{select_and_build, AccountTransaction, FeeModel, Payable};
use crate::participants::ParticipantKeySet;
use crate::provider::{Spendable, SpendableProvider};
use crate::script::{multisig_script_sig, push_bytes, KeyOrdering, MultisigScriptBuilder};
use crate::AccountError;

/// How far past the issued counters address scans look by default.
pub const DEFAULT_LOOKAHEAD: u32 = 20;

/// State both account flavours share. The account owns its cache; a
/// snapshot is the only way state leaves the account.
#[derive(Debug)]
struct AccountState {
    network: Network,
    lookahead: u32,
    fee_model: FeeModel,
    cache: DerivationCache,
    address_book: HashMap<Address, HdPath>,
}

impl AccountState {
    fn new(network: Network, cache: DerivationCache) -> Self {
        AccountState {
            network,
            lookahead: DEFAULT_LOOKAHEAD,
            fee_model: FeeModel::default(),
            cache,
            address_book: HashMap::new(),
        }
    }
}

/// Single-key account paying to P2PKH leaf addresses.
#[derive(Debug)]
pub struct SimpleAccount {
    key: AccountKey,
    state: AccountState,
}

impl SimpleAccount {
    pub fn new(key: AccountKey) -> Self {
        Self::with_cache(key, DerivationCache::new())
    }

    /// Rebuild an account around a previously snapshotted cache.
    pub fn with_cache(key: AccountKey, cache: DerivationCache) -> Self {
        let network = key.network();
        SimpleAccount {
            key,
            state: AccountState::new(network, cache),
        }
    }

    pub fn key(&self) -> &AccountKey {
        &self.key
    }

    fn leaf_xpub(&mut self, path: &HdPath) -> Result<Xpub, AccountError> {
        if let Some(keys) = self.state.cache.get(path) {
            if let Some(first) = keys.first() {
                return Ok(*first);
            }
        }
        let xpub = self.key.leaf_for_path(path)?.public();
        self.state.cache.insert(path.clone(), vec![xpub]);
        Ok(xpub)
    }

    pub fn address_for_path(&mut self, path: &HdPath) -> Result<Address, AccountError> {
        let xpub = self.leaf_xpub(path)?;
        let address = Address::p2pkh(xpub.to_pub(), self.state.network);
        self.state.address_book.insert(address.clone(), path.clone());
        Ok(address)
    }

    /// Sign every input tagged with a chain path. Inputs without a path
    /// belong to someone else and are left alone.
    pub fn sign(&mut self, draft: &mut AccountTransaction) -> Result<(), AccountError> {
        if !self.key.is_private() {
            return Err(AccountError::NoPrivateKey);
        }
        let secp = Secp256k1::new();
        for index in 0..draft.transaction().input.len() {
            let Some(path) = draft.input_chain_paths()[index].clone() else {
                continue;
            };
            let leaf = self.key.leaf_for_path(&path)?;
            let xpriv = leaf.xpriv().ok_or(AccountError::NoPrivateKey)?;
            let pubkey = leaf.public().to_pub();

            let script_code = ScriptBuf::new_p2pkh(&pubkey.pubkey_hash());
            let sighash = legacy_sighash(draft.transaction(), index, &script_code)?;
            let signature = encode_signature(secp.sign_ecdsa(&sighash, &xpriv.private_key));

            let mut builder = push_bytes(Builder::new(), &signature)?;
            builder = builder.push_slice(pubkey.0.serialize());
            draft.transaction_mut().input[index].script_sig = builder.into_script();
        }
        Ok(())
    }
}

/// m-of-n multisig account paying to P2SH leaf addresses.
///
/// The quorum is fixed at construction. With an explicit `required` it is
/// taken as given; otherwise it is the final participant count minus one,
/// which comes out the same whether the last key is already present
/// (`complete`, n keys, quorum n - 1) or still expected (incomplete,
/// n keys now, quorum n).
#[derive(Debug)]
pub struct MultisigAccount {
    participants: ParticipantKeySet,
    required: usize,
    ordering: KeyOrdering,
    state: AccountState,
}

impl MultisigAccount {
    pub fn new(participants: ParticipantKeySet, required: Option<usize>, network: Network) -> Self {
        Self::with_cache(participants, required, network, DerivationCache::new())
    }

    pub fn with_cache(
        participants: ParticipantKeySet,
        required: Option<usize>,
        network: Network,
        cache: DerivationCache,
    ) -> Self {
        let required = required.unwrap_or_else(|| {
            if participants.is_complete() {
                participants.len().saturating_sub(1)
            } else {
                participants.len()
            }
        });
        MultisigAccount {
            participants,
            required,
            ordering: KeyOrdering::default(),
            state: AccountState::new(network, cache),
        }
    }

    pub fn with_ordering(mut self, ordering: KeyOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn participants(&self) -> &ParticipantKeySet {
        &self.participants
    }

    pub fn required_sigs(&self) -> usize {
        self.required
    }

    pub fn add_participant(&mut self, key: AccountKey) -> Result<(), AccountError> {
        self.participants.add_participant(key)
    }

    pub fn mark_complete(&mut self) -> Result<(), AccountError> {
        self.participants.mark_complete()
    }

    pub fn script_builder(&self) -> MultisigScriptBuilder {
        MultisigScriptBuilder::new(self.required, self.ordering)
    }

    /// Every participant's leaf pubkey at `path`, cached after the first
    /// derivation. A cached entry from before the set was complete is
    /// detected by its length and re-derived.
    fn leaf_pubkeys(&mut self, path: &HdPath) -> Result<Vec<CompressedPublicKey>, AccountError> {
        let cached = self
            .state
            .cache
            .get(path)
            .filter(|keys| keys.len() == self.participants.len());
        let xpubs = match cached {
            Some(keys) => keys,
            None => {
                let mut keys = Vec::with_capacity(self.participants.len());
                for participant in self.participants.keys() {
                    keys.push(participant.leaf_for_path(path)?.public());
                }
                self.state.cache.insert(path.clone(), keys.clone());
                keys
            }
        };
        Ok(xpubs.iter().map(|xpub| xpub.to_pub()).collect())
    }

    pub fn redeem_script_for(&mut self, path: &HdPath) -> Result<ScriptBuf, AccountError> {
        if !self.participants.is_complete() {
            return Err(AccountError::IncompleteAccount);
        }
        let keys = self.leaf_pubkeys(path)?;
        self.script_builder().redeem_script(&keys)
    }

    pub fn address_for_path(&mut self, path: &HdPath) -> Result<Address, AccountError> {
        if !self.participants.is_complete() {
            return Err(AccountError::IncompleteAccount);
        }
        let keys = self.leaf_pubkeys(path)?;
        let address = self.script_builder().address(&keys, self.state.network)?;
        self.state.address_book.insert(address.clone(), path.clone());
        Ok(address)
    }

    /// Sign every path-tagged input with the locally held key and pad the
    /// remaining quorum slots with the placeholder signature, so the
    /// script sig always carries `required` signature pushes.
    pub fn sign(&mut self, draft: &mut AccountTransaction) -> Result<(), AccountError> {
        if !self.participants.is_complete() {
            return Err(AccountError::IncompleteAccount);
        }
        let local = self
            .participants
            .local_private()
            .cloned()
            .ok_or(AccountError::NoPrivateKey)?;
        let secp = Secp256k1::new();

        for index in 0..draft.transaction().input.len() {
            let Some(path) = draft.input_chain_paths()[index].clone() else {
                continue;
            };
            let keys = self.leaf_pubkeys(&path)?;
            let builder = self.script_builder();
            let redeem = builder.redeem_script(&keys)?;

            let leaf = local.leaf_for_path(&path)?;
            let xpriv = leaf.xpriv().ok_or(AccountError::NoPrivateKey)?;
            let local_pub = leaf.public().to_pub();

            let sighash = legacy_sighash(draft.transaction(), index, &redeem)?;
            let signature = encode_signature(secp.sign_ecdsa(&sighash, &xpriv.private_key));

            // One real signature per redeem key we hold, capped at the
            // quorum. Deterministic signing makes the copies identical.
            let slots = keys
                .iter()
                .filter(|key| **key == local_pub)
                .count()
                .min(self.required);
            let signatures = vec![signature; slots];
            draft.transaction_mut().input[index].script_sig =
                multisig_script_sig(&signatures, self.required, &redeem)?;
        }
        Ok(())
    }
}

fn legacy_sighash(
    tx: &Transaction,
    index: usize,
    script_code: &ScriptBuf,
) -> Result<Message, AccountError> {
    let sighash = SighashCache::new(tx)
        .legacy_signature_hash(index, script_code, EcdsaSighashType::All.to_u32())
        .map_err(|e| AccountError::Sighash(e.to_string()))?;
    Ok(Message::from_digest(sighash.to_byte_array()))
}

fn encode_signature(signature: secp256k1::ecdsa::Signature) -> Vec<u8> {
    EcdsaSignature {
        signature,
        sighash_type: EcdsaSighashType::All,
    }
    .to_vec()
}

/// Either account flavour behind one surface.
#[derive(Debug)]
pub enum Account {
    Simple(SimpleAccount),
    Multisig(MultisigAccount),
}

impl From<SimpleAccount> for Account {
    fn from(account: SimpleAccount) -> Self {
        Account::Simple(account)
    }
}

impl From<MultisigAccount> for Account {
    fn from(account: MultisigAccount) -> Self {
        Account::Multisig(account)
    }
}

impl Account {
    fn state(&self) -> &AccountState {
        match self {
            Account::Simple(account) => &account.state,
            Account::Multisig(account) => &account.state,
        }
    }

    fn state_mut(&mut self) -> &mut AccountState {
        match self {
            Account::Simple(account) => &mut account.state,
            Account::Multisig(account) => &mut account.state,
        }
    }

    pub fn network(&self) -> Network {
        self.state().network
    }

    pub fn lookahead(&self) -> u32 {
        self.state().lookahead
    }

    pub fn set_lookahead(&mut self, lookahead: u32) {
        self.state_mut().lookahead = lookahead;
    }

    pub fn set_fee_model(&mut self, fee_model: FeeModel) {
        self.state_mut().fee_model = fee_model;
    }

    pub fn cache(&self) -> &DerivationCache {
        &self.state().cache
    }

    /// JSON snapshot of the derivation cache and issued counters, for
    /// the caller to persist wherever it keeps account records.
    pub fn snapshot_cache(&self) -> Result<String, AccountError> {
        Ok(self.state().cache.snapshot()?)
    }

    /// Address at a fixed index. Does not advance the issued counters.
    pub fn address(&mut self, subchain: Subchain, n: u32) -> Result<Address, AccountError> {
        let path = HdPath::leaf(subchain, n)?;
        self.address_for_path(&path)
    }

    pub fn address_for_path(&mut self, path: &HdPath) -> Result<Address, AccountError> {
        match self {
            Account::Simple(account) => account.address_for_path(path),
            Account::Multisig(account) => account.address_for_path(path),
        }
    }

    /// Hand out the next unissued address on `subchain` and advance the
    /// counter. Issued indices are never reused.
    pub fn issue_address(&mut self, subchain: Subchain) -> Result<(Address, HdPath), AccountError> {
        let index = self.state_mut().cache.issue_next(subchain);
        let path = HdPath::leaf(subchain, index)?;
        let address = self.address_for_path(&path)?;
        Ok((address, path))
    }

    /// The most recently issued receive address, if any.
    pub fn current_address(&mut self) -> Result<Option<Address>, AccountError> {
        self.latest_issued(Subchain::Receive)
    }

    pub fn current_change_address(&mut self) -> Result<Option<Address>, AccountError> {
        self.latest_issued(Subchain::Change)
    }

    fn latest_issued(&mut self, subchain: Subchain) -> Result<Option<Address>, AccountError> {
        let issued = self.state().cache.issued(subchain);
        if issued == 0 {
            return Ok(None);
        }
        Ok(Some(self.address(subchain, issued - 1)?))
    }

    /// Every address this account watches: issued plus lookahead on the
    /// receive subchain, then the same on the change subchain.
    pub fn addresses(&mut self, with_lookahead: bool) -> Result<Vec<Address>, AccountError> {
        let lookahead = if with_lookahead { self.state().lookahead } else { 0 };
        let mut all = Vec::new();
        for subchain in [Subchain::Receive, Subchain::Change] {
            let upto = self.state().cache.issued(subchain) + lookahead;
            for n in 0..upto {
                all.push(self.address(subchain, n)?);
            }
        }
        Ok(all)
    }

    pub fn address_map(
        &mut self,
        with_lookahead: bool,
    ) -> Result<HashMap<Address, HdPath>, AccountError> {
        let lookahead = if with_lookahead { self.state().lookahead } else { 0 };
        let mut map = HashMap::new();
        for subchain in [Subchain::Receive, Subchain::Change] {
            let upto = self.state().cache.issued(subchain) + lookahead;
            for n in 0..upto {
                let path = HdPath::leaf(subchain, n)?;
                map.insert(self.address_for_path(&path)?, path);
            }
        }
        Ok(map)
    }

    /// The chain path behind an address this account generated.
    pub fn path_for_address(&self, address: &Address) -> Result<HdPath, AccountError> {
        self.state()
            .address_book
            .get(address)
            .cloned()
            .ok_or_else(|| AccountError::UnknownAddress(address.to_string()))
    }

    pub fn spendables(
        &mut self,
        provider: &impl SpendableProvider,
    ) -> Result<Vec<Spendable>, AccountError> {
        let addresses = self.addresses(true)?;
        Ok(provider.spendables_for_addresses(&addresses)?)
    }

    pub fn balance(&mut self, provider: &impl SpendableProvider) -> Result<Amount, AccountError> {
        Ok(self.spendables(provider)?.iter().map(|s| s.value).sum())
    }

    /// Draft a payment from this account's spendables.
    pub fn build_payment(
        &mut self,
        payables: &[Payable],
        provider: &impl SpendableProvider,
    ) -> Result<AccountTransaction, AccountError> {
        let spendables = self.spendables(provider)?;
        self.build_payment_from(payables, &spendables)
    }

    /// Draft a payment from an explicit spendable list, consumed in
    /// order. Every spendable must sit on an address this account issued.
    pub fn build_payment_from(
        &mut self,
        payables: &[Payable],
        spendables: &[Spendable],
    ) -> Result<AccountTransaction, AccountError> {
        let fee_model = self.state().fee_model;
        select_and_build(self, payables, spendables, fee_model)
    }

    pub fn sign(&mut self, draft: &mut AccountTransaction) -> Result<(), AccountError> {
        match self {
            Account::Simple(account) => account.sign(draft),
            Account::Multisig(account) => account.sign(draft),
        }
    }

    /// Redeem script for a multisig leaf; `None` on single-key accounts.
    pub fn redeem_script_for(&mut self, path: &HdPath) -> Result<Option<ScriptBuf>, AccountError> {
        match self {
            Account::Simple(_) => Ok(None),
            Account::Multisig(account) => Ok(Some(account.redeem_script_for(path)?)),
        }
    }
}
