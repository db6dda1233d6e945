//! Participant key sets
//!
//! The ordered keys behind a multisig account: the local device key
//! first by convention, then recovery keys, with the co-signer's key
//! appended once fetched. Completion is a one-way door; script building
//! refuses to run before it.

use covault_core::AccountKey;

use crate::AccountError;

#[derive(Debug, Clone)]
pub struct ParticipantKeySet {
    keys: Vec<AccountKey>,
    complete: bool,
}

impl ParticipantKeySet {
    pub fn new(keys: Vec<AccountKey>, complete: bool) -> Self {
        ParticipantKeySet { keys, complete }
    }

    /// Append a participant. Fails once the set is complete.
    pub fn add_participant(&mut self, key: AccountKey) -> Result<(), AccountError> {
        if self.complete {
            return Err(AccountError::AlreadyComplete);
        }
        self.keys.push(key);
        Ok(())
    }

    /// Seal the set. Sealing twice is an error.
    pub fn mark_complete(&mut self) -> Result<(), AccountError> {
        if self.complete {
            return Err(AccountError::AlreadyComplete);
        }
        self.complete = true;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[AccountKey] {
        &self.keys
    }

    /// Base58 xpub strings in participant order.
    pub fn public_hwifs(&self) -> Vec<String> {
        self.keys.iter().map(|key| key.public_hwif()).collect()
    }

    /// The first participant we hold private material for.
    pub fn local_private(&self) -> Option<&AccountKey> {
        self.keys.iter().find(|key| key.is_private())
    }
}
