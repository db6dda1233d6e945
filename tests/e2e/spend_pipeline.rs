//! End-to-end spend pipeline, no network access.
//!
//! These tests walk the whole flow a wallet runs through:
//! 1. Assemble a participant set, seal it, derive deposit addresses
//! 2. Discover spendables through a provider and draft a payment
//! 3. Sign locally, placeholders filling the missing quorum slots
//! 4. Assemble the body a co-signing service would receive

use std::collections::HashMap;

use bitcoin::absolute::LockTime;
use bitcoin::blockdata::script::Instruction;
use bitcoin::transaction::Version;
use bitcoin::{consensus, Address, Amount, Network, OutPoint, Transaction, TxOut, Txid};

use covault_account::{
    Account, AccountError, MultisigAccount, ParticipantKeySet, Payable, ProviderError, Spendable,
    SpendableProvider,
};
use covault_core::{AccountKey, DerivationCache, HdPath, MasterKey, Subchain};
use covault_oracle::{account_id, cosign_request, new_spend_id};

const WALLET_SEED: &[u8] = b"aaa-2015-02-10";
const RECOVERY_XPUB: &str = "xpub661MyMwAqRbcGmRK6wKJrfMXoenZ86PMUfBWNvmmp5c51PyyzjY7yJL9venRUYqmSqNo7iGqHbVWkTVYzY2drw57vr45iHxV7NsAqF4ZWg5";
const COSIGNER_XPUB: &str = "xpub68rQ8y4gfKeqG3sxQQE7uNwjnjcTiEZDQCrr2witfS3VrZ3QkeR2XuiQWUpdQRUVShcyVzjX2ZvDWHS2SZcZJXaGC7HybSPVMDXErbRRHwn";

// ============================================================================
// In-memory chain fixture
// ============================================================================

/// Stands in for a chain backend: remembers every funding transaction so
/// the cosign assembly can look previous transactions up by txid.
#[derive(Default)]
struct ChainFixture {
    utxos: HashMap<Address, Vec<Spendable>>,
    transactions: HashMap<Txid, Transaction>,
}

impl ChainFixture {
    /// Confirm a payment of `value` to `address`.
    fn fund(&mut self, address: &Address, value: Amount) -> OutPoint {
        let tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![TxOut {
                value,
                script_pubkey: address.script_pubkey(),
            }],
        };
        let outpoint = OutPoint {
            txid: tx.compute_txid(),
            vout: 0,
        };
        self.transactions.insert(outpoint.txid, tx);
        self.utxos
            .entry(address.clone())
            .or_default()
            .push(Spendable::new(outpoint, value, address.clone()));
        outpoint
    }
}

impl SpendableProvider for ChainFixture {
    fn spendables_for_address(&self, address: &Address) -> Result<Vec<Spendable>, ProviderError> {
        Ok(self.utxos.get(address).cloned().unwrap_or_default())
    }
}

fn wallet() -> MasterKey {
    MasterKey::from_seed(WALLET_SEED, Network::Bitcoin).unwrap()
}

fn external_address() -> Address {
    // Unrelated P2SH output, nothing in the account can spend it.
    let script = bitcoin::ScriptBuf::from_bytes(vec![0x51]);
    Address::p2sh(&script, Network::Bitcoin).unwrap()
}

// ============================================================================
// 1. Participant lifecycle converges on the recorded keychain
// ============================================================================

#[test]
fn test_lifecycle_reaches_recorded_keychain() {
    // Local keys first. The set stays open until the co-signer's key
    // arrives, and the quorum freezes at the local key count.
    let participants = ParticipantKeySet::new(
        vec![
            wallet().as_account(),
            AccountKey::from_hwif(RECOVERY_XPUB).unwrap(),
        ],
        false,
    );
    let mut account = MultisigAccount::new(participants, None, Network::Bitcoin);
    assert_eq!(account.required_sigs(), 2);

    let path: HdPath = "0/0/1".parse().unwrap();
    assert!(matches!(
        account.redeem_script_for(&path),
        Err(AccountError::IncompleteAccount)
    ));

    // The co-signer's key arrives (in production via a keychain fetch).
    account
        .add_participant(AccountKey::from_hwif(COSIGNER_XPUB).unwrap())
        .unwrap();
    account.mark_complete().unwrap();

    // Same 2-of-3 keychain as building the full set in one go.
    let address = account.address_for_path(&path).unwrap();
    assert_eq!(address.to_string(), "34DjTcNWGReJV4xx7R1AWK7FTz3xMwMcjA");
    assert_eq!(
        account_id(&wallet().as_account().public_hwif()).to_string(),
        "c22eb270-69b5-572e-9c87-59b4e466e30c"
    );
}

// ============================================================================
// 2. Fund, draft, sign, assemble
// ============================================================================

fn sealed_account() -> Account {
    let participants = ParticipantKeySet::new(
        vec![
            wallet().as_account(),
            AccountKey::from_hwif(RECOVERY_XPUB).unwrap(),
            AccountKey::from_hwif(COSIGNER_XPUB).unwrap(),
        ],
        true,
    );
    Account::from(MultisigAccount::new(participants, None, Network::Bitcoin))
}

#[test]
fn test_spend_pipeline_from_deposit_to_cosign_body() {
    let mut account = sealed_account();
    let mut chain = ChainFixture::default();

    // Deposit on a freshly issued receive address.
    let (deposit, deposit_path) = account.issue_address(Subchain::Receive).unwrap();
    assert_eq!(deposit_path.to_string(), "0/0");
    assert_eq!(account.current_address().unwrap(), Some(deposit.clone()));
    chain.fund(&deposit, Amount::from_sat(400_000));
    assert_eq!(account.balance(&chain).unwrap(), Amount::from_sat(400_000));

    // Draft a payment. The leftover is above dust, so a change output
    // is issued on the change subchain.
    let payables = [Payable::new(external_address(), Amount::from_sat(150_000))];
    let mut draft = account.build_payment(&payables, &chain).unwrap();

    let tx = draft.transaction();
    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.output.len(), 2);
    assert_eq!(tx.output[0].value, Amount::from_sat(150_000));
    let input_sum = Amount::from_sat(400_000);
    let output_sum: Amount = tx.output.iter().map(|o| o.value).sum();
    assert_eq!(input_sum - output_sum, Amount::from_sat(1_000), "fee");

    assert_eq!(draft.input_chain_paths(), &[Some(deposit_path.clone())]);
    assert_eq!(
        draft.output_chain_paths(),
        &[None, Some("1/0".parse().unwrap())]
    );
    let change = account.current_change_address().unwrap().unwrap();
    assert_eq!(tx.output[1].script_pubkey, change.script_pubkey());

    // Local signature plus placeholders for the rest of the quorum.
    account.sign(&mut draft).unwrap();
    let redeem = account
        .redeem_script_for(&deposit_path)
        .unwrap()
        .expect("multisig leaf");
    let script_sig = &draft.transaction().input[0].script_sig;
    let pushes: Vec<_> = script_sig
        .instructions()
        .map(|i| i.unwrap())
        .collect();
    assert_eq!(pushes.len(), 4, "OP_0, signature, placeholder, redeem");
    assert!(matches!(pushes[0], Instruction::PushBytes(b) if b.is_empty()));
    assert!(matches!(pushes[3], Instruction::PushBytes(b) if b.as_bytes() == redeem.as_bytes()));

    // Assemble the cosign body.
    let Account::Multisig(multisig) = &mut account else {
        panic!("multisig account expected");
    };
    let spend_id = new_spend_id();
    let master_keys = vec![
        wallet().as_account().public_hwif(),
        RECOVERY_XPUB.to_string(),
    ];
    let request = cosign_request(
        multisig,
        &draft,
        &chain.transactions,
        "covault-e2e",
        master_keys.clone(),
        Some(spend_id.clone()),
    )
    .unwrap();

    assert_eq!(request.wallet_agent, "covault-e2e");
    assert_eq!(request.spend_id, Some(spend_id));
    assert_eq!(request.transaction.master_keys, master_keys);
    assert_eq!(
        request.transaction.chain_paths,
        vec![Some(deposit_path.to_string())]
    );
    assert_eq!(
        request.transaction.output_chain_paths,
        vec![None, Some("1/0".to_string())]
    );
    assert_eq!(
        request.transaction.input_scripts,
        vec![Some(hex::encode(redeem.as_bytes()))]
    );
    assert_eq!(request.transaction.input_transactions.len(), 1);

    // The submitted transaction decodes, and no placeholder survives in it.
    let submitted: Transaction =
        consensus::deserialize(&hex::decode(&request.transaction.bytes).unwrap()).unwrap();
    let dummy = covault_account::dummy_signature();
    for input in &submitted.input {
        let bytes = input.script_sig.as_bytes();
        assert!(!bytes.windows(dummy.len()).any(|w| w == dummy.as_slice()));
    }
}

// ============================================================================
// 3. Wire body shape
// ============================================================================

#[test]
fn test_cosign_body_is_camel_cased() {
    let mut account = sealed_account();
    let mut chain = ChainFixture::default();

    let (deposit, _) = account.issue_address(Subchain::Receive).unwrap();
    chain.fund(&deposit, Amount::from_sat(50_000));
    let payables = [Payable::new(external_address(), Amount::from_sat(20_000))];
    let mut draft = account.build_payment(&payables, &chain).unwrap();
    account.sign(&mut draft).unwrap();

    let Account::Multisig(multisig) = &mut account else {
        panic!("multisig account expected");
    };
    let request = cosign_request(
        multisig,
        &draft,
        &chain.transactions,
        "covault-e2e",
        vec![wallet().as_account().public_hwif()],
        None,
    )
    .unwrap();

    let body = serde_json::to_value(&request).unwrap();
    assert!(body["walletAgent"].is_string());
    assert!(body["transaction"]["inputScripts"].is_array());
    assert!(body["transaction"]["inputTransactions"].is_array());
    assert!(body["transaction"]["chainPaths"].is_array());
    assert!(body["transaction"]["outputChainPaths"].is_array());
    assert!(body["transaction"]["masterKeys"].is_array());
    // Absent spend id is omitted, not null.
    assert!(body.get("spendId").is_none());
}

// ============================================================================
// 4. Cache snapshots survive sessions
// ============================================================================

#[test]
fn test_cache_snapshot_survives_sessions() {
    let mut account = sealed_account();
    let (first, _) = account.issue_address(Subchain::Receive).unwrap();
    let (second, second_path) = account.issue_address(Subchain::Receive).unwrap();
    assert_ne!(first, second);

    let snapshot = account.snapshot_cache().unwrap();

    // A later session restores the cache instead of re-deriving.
    let participants = ParticipantKeySet::new(
        vec![
            wallet().as_account(),
            AccountKey::from_hwif(RECOVERY_XPUB).unwrap(),
            AccountKey::from_hwif(COSIGNER_XPUB).unwrap(),
        ],
        true,
    );
    let restored = DerivationCache::restore(&snapshot).unwrap();
    let mut account = Account::from(MultisigAccount::with_cache(
        participants,
        None,
        Network::Bitcoin,
        restored,
    ));

    assert_eq!(account.current_address().unwrap(), Some(second.clone()));
    // Regenerating the issued range rebuilds the address book for lookups.
    account.addresses(false).unwrap();
    assert_eq!(account.path_for_address(&second).unwrap(), second_path);
}
