//! Wire types
//!
//! JSON bodies of the co-signing service, field names in camelCase.
//! Requests serialize exactly what the service expects; the response
//! type is one permissive shape covering success and failure bodies,
//! interpreted in [`crate::client`].

use serde::{Deserialize, Serialize};

/// Body of `POST /keychains/{id}`, registering a new keychain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeychainRequest {
    pub wallet_agent: String,
    pub ruleset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_username: Option<String>,
    pub pii: ContactInfo,
    pub parameters: PolicyParameters,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContactInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyParameters {
    pub levels: Vec<PolicyLevel>,
}

/// One entry of the `parameters.levels` array. The service mixes two
/// record shapes in the same array, so this is untagged.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PolicyLevel {
    /// Spending-velocity ceiling: at most `value` of `asset` per
    /// `period` seconds before the service defers for verification.
    Velocity { asset: String, period: u32, value: f64 },
    /// Completion delay plus the notification calls placed during it.
    Delay { delay: u32, calls: Vec<String> },
}

/// Body of `POST /keychains/{id}/transactions`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CosignRequest {
    pub wallet_agent: String,
    pub transaction: CosignTransaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spend_id: Option<String>,
}

/// The transaction under co-signature and everything the service needs
/// to validate it. Per-input and per-output arrays stay aligned with
/// the transaction; slots the account does not control are null.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CosignTransaction {
    pub bytes: String,
    pub input_scripts: Vec<Option<String>>,
    pub input_transactions: Vec<String>,
    pub chain_paths: Vec<Option<String>>,
    pub output_chain_paths: Vec<Option<String>>,
    pub master_keys: Vec<String>,
}

/// Any response body the service sends back, success or failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleResponse {
    pub result: Option<String>,
    pub error: Option<String>,
    pub keys: Option<KeyRing>,
    pub transaction: Option<SignedTransaction>,
    pub now: Option<String>,
    pub spend_id: Option<String>,
    pub deferral: Option<Deferral>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyRing {
    pub default: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedTransaction {
    pub bytes: String,
}

/// Note that the service is holding completion pending a policy check.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deferral {
    pub reason: Option<String>,
    pub until: Option<String>,
    pub verifications: Option<serde_json::Value>,
}
