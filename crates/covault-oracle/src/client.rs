//! Oracle HTTP client
//!
//! Thin reqwest wrapper around the three keychain calls plus the
//! [`Oracle`] convenience binding for one account. Network I/O stays in
//! the async methods; what a `(status, body)` pair means is decided by
//! [`interpret`], a pure function with its own tests.

use std::str::FromStr;
use std::time::Duration;

use bitcoin::bip32::Xpub;
use bitcoin::{consensus, Transaction};
use uuid::Uuid;

use covault_account::{AccountError, AccountTransaction, MultisigAccount, TxLookup};

use crate::request::cosign_request;
use crate::wire::{
    ContactInfo, CosignRequest, Deferral, KeychainRequest, OracleResponse, PolicyLevel,
    PolicyParameters,
};
use crate::{account_id, OracleError};

/// Production co-signing endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://s.digitaloracle.co";

const DEFAULT_WALLET_AGENT: &str = "covault-oracle-0.1";

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub base_url: String,
    pub wallet_agent: String,
    pub timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            base_url: DEFAULT_ENDPOINT.to_string(),
            wallet_agent: DEFAULT_WALLET_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Client for one co-signing service endpoint.
#[derive(Debug, Clone)]
pub struct OracleClient {
    http: reqwest::Client,
    base_url: String,
    wallet_agent: String,
}

impl OracleClient {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(OracleClient {
            http,
            base_url: config.base_url,
            wallet_agent: config.wallet_agent,
        })
    }

    pub fn wallet_agent(&self) -> &str {
        &self.wallet_agent
    }

    fn keychain_url(&self, id: &Uuid) -> String {
        format!("{}/keychains/{}", self.base_url, id)
    }

    /// Fetch the co-signer's keys for an existing keychain.
    pub async fn fetch_keychain(&self, id: &Uuid) -> Result<Vec<Xpub>, OracleError> {
        let url = self.keychain_url(id);
        log::debug!("fetching keychain {url}");
        let response = self.http.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        oracle_keys(&interpret(status, &body, false)?)
    }

    /// Register a keychain and receive the co-signer's keys. A keychain
    /// that was registered before answers [`OracleError::AlreadyExists`];
    /// fetch it instead.
    pub async fn create_keychain(
        &self,
        id: &Uuid,
        request: &KeychainRequest,
    ) -> Result<Vec<Xpub>, OracleError> {
        let url = self.keychain_url(id);
        log::debug!("creating keychain {url}");
        let response = self.http.post(url).json(request).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        oracle_keys(&interpret(status, &body, true)?)
    }

    /// Submit a transaction for co-signature.
    ///
    /// A timeout or any other transport failure surfaces as
    /// [`OracleError::Protocol`] and is not retried here. When retrying,
    /// resend with the original spend id so the service recognizes the
    /// same logical payment instead of acting twice.
    pub async fn cosign(
        &self,
        id: &Uuid,
        request: &CosignRequest,
    ) -> Result<CosignOutcome, OracleError> {
        let url = format!("{}/transactions", self.keychain_url(id));
        log::debug!("submitting transaction to {url}");
        let response = self.http.post(url).json(request).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        cosign_outcome(interpret(status, &body, false)?)
    }
}

/// Decide what a response means. Statuses outside 200/400 and bodies
/// that do not parse are protocol errors; a 400 `already exists` during
/// creation is its own outcome; everything else non-successful is a
/// rejection carrying the raw body.
fn interpret(status: u16, body: &str, creating: bool) -> Result<OracleResponse, OracleError> {
    if status != 200 && status != 400 {
        return Err(OracleError::Protocol(format!(
            "unexpected status {status}: {body}"
        )));
    }
    let response: OracleResponse = serde_json::from_str(body)
        .map_err(|e| OracleError::Protocol(format!("unparseable response body: {e}")))?;
    if status == 200 && response.result.as_deref() == Some("success") {
        return Ok(response);
    }
    if creating && status == 400 && response.error.as_deref() == Some("already exists") {
        return Err(OracleError::AlreadyExists);
    }
    Err(OracleError::Rejected(body.to_string()))
}

fn oracle_keys(response: &OracleResponse) -> Result<Vec<Xpub>, OracleError> {
    let Some(ring) = response.keys.as_ref() else {
        return Err(OracleError::Protocol("response carried no keys".into()));
    };
    let mut keys = Vec::with_capacity(ring.default.len());
    for hwif in &ring.default {
        keys.push(
            Xpub::from_str(hwif)
                .map_err(|e| OracleError::Protocol(format!("bad key in response: {e}")))?,
        );
    }
    if keys.is_empty() {
        return Err(OracleError::Protocol("response carried no keys".into()));
    }
    Ok(keys)
}

/// What a successful cosign call resolved to.
#[derive(Debug, Clone)]
pub struct CosignOutcome {
    /// The finalized transaction, absent while completion is deferred.
    pub transaction: Option<Transaction>,
    /// Server time of the decision.
    pub now: Option<String>,
    /// Spend id the service filed the payment under.
    pub spend_id: Option<String>,
    /// Present when the service is holding the signature for a policy
    /// check, for example a velocity limit.
    pub deferral: Option<Deferral>,
}

fn cosign_outcome(response: OracleResponse) -> Result<CosignOutcome, OracleError> {
    let transaction = match &response.transaction {
        Some(envelope) => {
            let bytes = hex::decode(&envelope.bytes)
                .map_err(|e| OracleError::Protocol(format!("bad transaction hex: {e}")))?;
            let tx = consensus::deserialize(&bytes)
                .map_err(|e| OracleError::Protocol(format!("bad transaction: {e}")))?;
            Some(tx)
        }
        None => None,
    };
    Ok(CosignOutcome {
        transaction,
        now: response.now,
        spend_id: response.spend_id,
        deferral: response.deferral,
    })
}

/// Policy and contact details for registering a keychain. Each contact
/// channel that is present is also wired into the notification calls.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub manager: Option<String>,
    pub velocity_asset: String,
    pub velocity_period: u32,
    pub velocity_value: f64,
    pub delay: u32,
}

impl Default for CreateOptions {
    fn default() -> Self {
        CreateOptions {
            email: None,
            phone: None,
            manager: None,
            velocity_asset: "BTC".to_string(),
            velocity_period: 60,
            velocity_value: 0.001,
            delay: 0,
        }
    }
}

impl CreateOptions {
    pub fn to_request(&self, wallet_agent: &str, keys: Vec<String>) -> KeychainRequest {
        let mut pii = ContactInfo::default();
        let mut calls = Vec::new();
        if let Some(ref email) = self.email {
            pii.email = Some(email.clone());
            calls.push("email".to_string());
        }
        if let Some(ref phone) = self.phone {
            pii.phone = Some(phone.clone());
            calls.push("phone".to_string());
        }
        KeychainRequest {
            wallet_agent: wallet_agent.to_string(),
            ruleset_id: "default".to_string(),
            manager_username: self.manager.clone(),
            pii,
            parameters: PolicyParameters {
                levels: vec![
                    PolicyLevel::Velocity {
                        asset: self.velocity_asset.clone(),
                        period: self.velocity_period,
                        value: self.velocity_value,
                    },
                    PolicyLevel::Delay {
                        delay: self.delay,
                        calls,
                    },
                ],
            },
            keys,
        }
    }
}

/// One account's binding to the co-signing service: the client plus the
/// account's non-oracle public keys in participant order, local key
/// first. The first key fixes the keychain identity.
pub struct Oracle {
    client: OracleClient,
    public_keys: Vec<String>,
}

impl Oracle {
    pub fn new(client: OracleClient, public_keys: Vec<String>) -> Result<Self, OracleError> {
        if public_keys.is_empty() {
            return Err(OracleError::Account(AccountError::IncompleteAccount));
        }
        Ok(Oracle {
            client,
            public_keys,
        })
    }

    pub fn account_id(&self) -> Uuid {
        account_id(&self.public_keys[0])
    }

    pub fn public_keys(&self) -> &[String] {
        &self.public_keys
    }

    /// Fetch the co-signer's keys; fold them into the participant set to
    /// complete the account.
    pub async fn fetch(&self) -> Result<Vec<Xpub>, OracleError> {
        self.client.fetch_keychain(&self.account_id()).await
    }

    pub async fn create(&self, options: &CreateOptions) -> Result<Vec<Xpub>, OracleError> {
        let request = options.to_request(self.client.wallet_agent(), self.public_keys.clone());
        self.client
            .create_keychain(&self.account_id(), &request)
            .await
    }

    /// Assemble and submit the cosign request for a locally signed
    /// draft. Pass the same `spend_id` again when retrying.
    pub async fn cosign(
        &self,
        account: &mut MultisigAccount,
        draft: &AccountTransaction,
        lookup: &impl TxLookup,
        spend_id: Option<String>,
    ) -> Result<CosignOutcome, OracleError> {
        let request = cosign_request(
            account,
            draft,
            lookup,
            self.client.wallet_agent(),
            self.public_keys.clone(),
            spend_id,
        )?;
        self.client.cosign(&self.account_id(), &request).await
    }
}
