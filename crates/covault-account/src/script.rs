//! Multisig script construction
//!
//! Builds the `OP_m <keys> OP_n OP_CHECKMULTISIG` redeem script and the
//! script sigs that spend it. Keys are sorted lexicographically by their
//! 33-byte SEC encoding unless the account opts out, so every
//! participant derives the same address from the same key set.

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, PushBytesBuf};
use bitcoin::ecdsa::Signature as EcdsaSignature;
use bitcoin::{Address, CompressedPublicKey, EcdsaSighashType, Network, ScriptBuf};
use secp256k1::constants::CURVE_ORDER;
use secp256k1::ecdsa::Signature;

use crate::AccountError;

/// How multisig keys are arranged inside the redeem script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyOrdering {
    /// Sort by SEC encoding. Participant order stops mattering.
    #[default]
    Lexicographic,
    /// Keep the caller's order verbatim.
    AsProvided,
}

#[derive(Debug, Clone, Copy)]
pub struct MultisigScriptBuilder {
    required: usize,
    ordering: KeyOrdering,
}

impl MultisigScriptBuilder {
    pub fn new(required: usize, ordering: KeyOrdering) -> Self {
        MultisigScriptBuilder { required, ordering }
    }

    pub fn required(&self) -> usize {
        self.required
    }

    /// The keys in the order they will appear in the redeem script.
    pub fn ordered_keys(&self, keys: &[CompressedPublicKey]) -> Vec<CompressedPublicKey> {
        let mut ordered = keys.to_vec();
        if self.ordering == KeyOrdering::Lexicographic {
            ordered.sort_unstable_by_key(|key| key.0.serialize());
        }
        ordered
    }

    pub fn redeem_script(&self, keys: &[CompressedPublicKey]) -> Result<ScriptBuf, AccountError> {
        if self.required < 1 || self.required > keys.len() {
            return Err(AccountError::BadQuorum {
                required: self.required,
                total: keys.len(),
            });
        }
        let mut builder = Builder::new().push_int(self.required as i64);
        for key in self.ordered_keys(keys) {
            builder = builder.push_slice(key.0.serialize());
        }
        Ok(builder
            .push_int(keys.len() as i64)
            .push_opcode(opcodes::all::OP_CHECKMULTISIG)
            .into_script())
    }

    pub fn address(
        &self,
        keys: &[CompressedPublicKey],
        network: Network,
    ) -> Result<Address, AccountError> {
        let redeem = self.redeem_script(keys)?;
        Address::p2sh(&redeem, network).map_err(|e| AccountError::Script(e.to_string()))
    }
}

/// A syntactically valid DER signature that can never verify.
///
/// r is the curve order minus one and s is the half order, so the pair
/// parses everywhere but matches no message. Co-signers recognize the
/// exact bytes and substitute their own signature in its slot.
pub fn dummy_signature() -> Vec<u8> {
    let mut r = CURVE_ORDER;
    r[31] -= 1;
    let mut s = [0u8; 32];
    let mut carry = 0u8;
    for (i, byte) in CURVE_ORDER.iter().enumerate() {
        s[i] = (byte >> 1) | (carry << 7);
        carry = byte & 1;
    }
    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&r);
    compact[32..].copy_from_slice(&s);
    let signature =
        Signature::from_compact(&compact).expect("r and s are both below the curve order");
    EcdsaSignature {
        signature,
        sighash_type: EcdsaSighashType::All,
    }
    .to_vec()
}

/// Append an arbitrary data push to a script under construction.
pub fn push_bytes(builder: Builder, data: &[u8]) -> Result<Builder, AccountError> {
    let push = PushBytesBuf::try_from(data.to_vec())
        .map_err(|_| AccountError::Script(format!("push of {} bytes exceeds limit", data.len())))?;
    Ok(builder.push_slice(push))
}

/// Script sig spending an m-of-n P2SH output: the CHECKMULTISIG OP_0,
/// real signatures in key order, dummies filling the remaining slots,
/// then the serialized redeem script.
pub(crate) fn multisig_script_sig(
    signatures: &[Vec<u8>],
    required: usize,
    redeem_script: &ScriptBuf,
) -> Result<ScriptBuf, AccountError> {
    // CHECKMULTISIG pops one extra stack item.
    let mut builder = Builder::new().push_opcode(opcodes::OP_0);
    for signature in signatures {
        builder = push_bytes(builder, signature)?;
    }
    let dummy = dummy_signature();
    for _ in signatures.len()..required {
        builder = push_bytes(builder, &dummy)?;
    }
    builder = push_bytes(builder, redeem_script.as_bytes())?;
    Ok(builder.into_script())
}
