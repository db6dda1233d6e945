//! Payment drafts and coin selection
//!
//! Selection is greedy over the provider's spendable order: take inputs
//! until the send amount is covered, then keep taking while the fee on
//! the growing draft is not. Change goes to a freshly issued change
//! address when it clears the dust threshold and is otherwise folded
//! into the fee.

use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{consensus, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use covault_core::{HdPath, Subchain};

use crate::account::Account;
use crate::provider::Spendable;
use crate::AccountError;

/// Outputs below this many satoshis are not worth creating.
pub const DUST_THRESHOLD: Amount = Amount::from_sat(546);

/// Flat per-kilobyte fee, charged per started kilobyte of the draft.
#[derive(Debug, Clone, Copy)]
pub struct FeeModel {
    per_kb: Amount,
}

impl Default for FeeModel {
    fn default() -> Self {
        FeeModel {
            per_kb: Amount::from_sat(1_000),
        }
    }
}

impl FeeModel {
    pub fn per_kb(rate: Amount) -> Self {
        FeeModel { per_kb: rate }
    }

    pub fn fee_for(&self, tx: &Transaction) -> Amount {
        let size = consensus::serialize(tx).len() as u64;
        self.per_kb * size.div_ceil(1_000)
    }
}

/// A requested payment: who gets how much.
#[derive(Debug, Clone)]
pub struct Payable {
    pub address: bitcoin::Address,
    pub amount: Amount,
}

impl Payable {
    pub fn new(address: bitcoin::Address, amount: Amount) -> Self {
        Payable { address, amount }
    }
}

/// A draft transaction with the chain path of every input and output the
/// account controls. External slots carry `None`.
///
/// Paths stay aligned with `tx.input` and `tx.output` by construction;
/// signing and co-signing both index into them positionally.
#[derive(Debug, Clone)]
pub struct AccountTransaction {
    tx: Transaction,
    input_paths: Vec<Option<HdPath>>,
    output_paths: Vec<Option<HdPath>>,
}

impl AccountTransaction {
    pub fn new(
        tx: Transaction,
        input_paths: Vec<Option<HdPath>>,
        output_paths: Vec<Option<HdPath>>,
    ) -> Result<Self, AccountError> {
        if input_paths.len() != tx.input.len() || output_paths.len() != tx.output.len() {
            return Err(AccountError::PathMismatch);
        }
        Ok(AccountTransaction {
            tx,
            input_paths,
            output_paths,
        })
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn transaction_mut(&mut self) -> &mut Transaction {
        &mut self.tx
    }

    pub fn into_transaction(self) -> Transaction {
        self.tx
    }

    pub fn txid(&self) -> Txid {
        self.tx.compute_txid()
    }

    pub fn input_chain_paths(&self) -> &[Option<HdPath>] {
        &self.input_paths
    }

    pub fn output_chain_paths(&self) -> &[Option<HdPath>] {
        &self.output_paths
    }

    pub fn spent_outpoints(&self) -> Vec<OutPoint> {
        self.tx.input.iter().map(|input| input.previous_output).collect()
    }
}

fn consume(
    account: &Account,
    spendable: &Spendable,
    tx: &mut Transaction,
    input_paths: &mut Vec<Option<HdPath>>,
    accumulated: &mut Amount,
) -> Result<(), AccountError> {
    let path = account.path_for_address(&spendable.address)?;
    tx.input.push(TxIn {
        previous_output: spendable.outpoint,
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::default(),
    });
    input_paths.push(Some(path));
    *accumulated += spendable.value;
    Ok(())
}

pub(crate) fn select_and_build(
    account: &mut Account,
    payables: &[Payable],
    spendables: &[Spendable],
    fee_model: FeeModel,
) -> Result<AccountTransaction, AccountError> {
    let send: Amount = payables.iter().map(|payable| payable.amount).sum();

    let mut tx = Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: Vec::new(),
        output: payables
            .iter()
            .map(|payable| TxOut {
                value: payable.amount,
                script_pubkey: payable.address.script_pubkey(),
            })
            .collect(),
    };
    let mut input_paths = Vec::new();
    let mut output_paths: Vec<Option<HdPath>> = vec![None; payables.len()];

    let mut remaining = spendables.iter();
    let mut accumulated = Amount::ZERO;

    while accumulated < send {
        let spendable = remaining.next().ok_or(AccountError::InsufficientBalance {
            available: accumulated,
        })?;
        consume(account, spendable, &mut tx, &mut input_paths, &mut accumulated)?;
    }

    // Every added input grows the draft, so the fee is recomputed and
    // re-checked after each one. Terminates once the list runs out.
    let mut fee = fee_model.fee_for(&tx);
    while accumulated < send + fee {
        let spendable = remaining.next().ok_or(AccountError::InsufficientBalance {
            available: accumulated,
        })?;
        consume(account, spendable, &mut tx, &mut input_paths, &mut accumulated)?;
        fee = fee_model.fee_for(&tx);
    }

    let leftover = accumulated - send - fee;
    if leftover > DUST_THRESHOLD {
        let (change_address, change_path) = account.issue_address(Subchain::Change)?;
        tx.output.push(TxOut {
            value: leftover,
            script_pubkey: change_address.script_pubkey(),
        });
        output_paths.push(Some(change_path));
    } else if leftover > Amount::ZERO {
        log::debug!(
            "absorbing {} sat of sub-dust leftover into the fee",
            leftover.to_sat()
        );
    }

    AccountTransaction::new(tx, input_paths, output_paths)
}
