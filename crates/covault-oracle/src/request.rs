//! Cosign request assembly
//!
//! Turns a locally signed draft into the body the co-signing service
//! wants: the transaction with placeholder signatures swapped for
//! `OP_0`, the redeem script and chain path of every account input, the
//! previous transaction of every input, and the change output paths.
//! Pure apart from the injected previous-transaction lookup, so the
//! whole assembly is covered by byte-exact tests.

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, Instruction};
use bitcoin::{consensus, Script, ScriptBuf, Transaction};

use covault_account::script::push_bytes;
use covault_account::{dummy_signature, AccountError, AccountTransaction, MultisigAccount, TxLookup};

use crate::wire::{CosignRequest, CosignTransaction};
use crate::OracleError;

/// Replace every placeholder signature push in the input scripts with
/// `OP_0`, the marker the service substitutes its own signature for.
/// Idempotent: an `OP_0` slot round-trips as an empty push.
pub fn strip_dummy_signatures(tx: &mut Transaction) -> Result<(), OracleError> {
    let dummy = dummy_signature();
    for input in &mut tx.input {
        input.script_sig = substitute(&input.script_sig, &dummy)?;
    }
    Ok(())
}

fn substitute(script: &Script, dummy: &[u8]) -> Result<ScriptBuf, OracleError> {
    let mut builder = Builder::new();
    for instruction in script.instructions() {
        let instruction =
            instruction.map_err(|e| OracleError::Account(AccountError::Script(e.to_string())))?;
        builder = match instruction {
            Instruction::PushBytes(bytes) if bytes.as_bytes() == dummy => {
                builder.push_opcode(opcodes::OP_0)
            }
            Instruction::PushBytes(bytes) => push_bytes(builder, bytes.as_bytes())?,
            Instruction::Op(op) => builder.push_opcode(op),
        };
    }
    Ok(builder.into_script())
}

/// Assemble the cosign body for a locally signed draft.
///
/// `master_keys` is the account's non-oracle public key list in
/// participant order; the service derives the keychain identity from its
/// first entry. Every input's previous transaction must resolve through
/// `lookup`, account-owned or not.
pub fn cosign_request(
    account: &mut MultisigAccount,
    draft: &AccountTransaction,
    lookup: &impl TxLookup,
    wallet_agent: &str,
    master_keys: Vec<String>,
    spend_id: Option<String>,
) -> Result<CosignRequest, OracleError> {
    let mut tx = draft.transaction().clone();
    strip_dummy_signatures(&mut tx)?;

    let mut input_scripts = Vec::with_capacity(tx.input.len());
    let mut input_transactions = Vec::with_capacity(tx.input.len());
    let mut chain_paths = Vec::with_capacity(tx.input.len());
    for (input, path) in tx.input.iter().zip(draft.input_chain_paths()) {
        let txid = input.previous_output.txid;
        let previous = lookup
            .lookup(&txid)?
            .ok_or(OracleError::TransactionLookupFailed(txid))?;
        input_transactions.push(hex::encode(consensus::serialize(&previous)));
        match path {
            Some(path) => {
                let redeem = account.redeem_script_for(path)?;
                input_scripts.push(Some(hex::encode(redeem.as_bytes())));
                chain_paths.push(Some(path.to_string()));
            }
            None => {
                input_scripts.push(None);
                chain_paths.push(None);
            }
        }
    }

    let output_chain_paths = draft
        .output_chain_paths()
        .iter()
        .map(|path| path.as_ref().map(|p| p.to_string()))
        .collect();

    Ok(CosignRequest {
        wallet_agent: wallet_agent.to_string(),
        transaction: CosignTransaction {
            bytes: hex::encode(consensus::serialize(&tx)),
            input_scripts,
            input_transactions,
            chain_paths,
            output_chain_paths,
            master_keys,
        },
        spend_id,
    })
}
