//! `WebAuthn` wire types
//!
//! JSON shapes exchanged with the browser. Field names follow the WebAuthn
//! JavaScript API so `navigator.credentials` payloads deserialize directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{AuthenticatorTransport, Challenge, CredentialId, UserHandle};
use crate::utils::encoding;

pub const PUBLIC_KEY_TYPE: &str = "public-key";

/// COSE algorithm identifiers this crate knows how to verify
pub mod cose_alg {
    pub const ES256: i64 = -7;
    pub const EDDSA: i64 = -8;
    pub const RS256: i64 = -257;
}

/// Whether the authenticator must verify the user (PIN, biometrics)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationPolicy {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

/// Whether the authenticator should create a discoverable credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyPolicy {
    Required,
    Preferred,
    #[default]
    Discouraged,
}

macro_rules! policy_strings {
    ($ty:ident) => {
        impl $ty {
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    Self::Required => "required",
                    Self::Preferred => "preferred",
                    Self::Discouraged => "discouraged",
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    "required" => Ok(Self::Required),
                    "preferred" => Ok(Self::Preferred),
                    "discouraged" => Ok(Self::Discouraged),
                    other => Err(format!("expected required, preferred or discouraged, got `{other}`")),
                }
            }
        }
    };
}

policy_strings!(UserVerificationPolicy);
policy_strings!(ResidentKeyPolicy);

/// `PublicKeyCredentialCreationOptions` sent to the client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub challenge: Challenge,
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    pub timeout: u64,        // milliseconds
    pub attestation: String, // always "none"
    #[serde(default)]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelectionCriteria,
}

/// `PublicKeyCredentialRequestOptions` sent to the client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    pub challenge: Challenge,
    pub timeout: u64, // milliseconds
    pub rp_id: String,
    #[serde(default)]
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub user_verification: UserVerificationPolicy,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub id: UserHandle,
    pub name: String,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub r#type: String,
    pub alg: i64,
}

impl PublicKeyCredentialParameters {
    #[must_use]
    pub fn public_key(alg: i64) -> Self {
        Self {
            r#type: PUBLIC_KEY_TYPE.to_string(),
            alg,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>, // "platform", "cross-platform"
    pub resident_key: ResidentKeyPolicy,
    pub require_resident_key: bool, // Level 1 clients only read this one
    pub user_verification: UserVerificationPolicy,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub r#type: String,
    pub id: CredentialId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<AuthenticatorTransport>,
}

impl PublicKeyCredentialDescriptor {
    #[must_use]
    pub fn new(id: CredentialId, transports: Vec<AuthenticatorTransport>) -> Self {
        Self {
            r#type: PUBLIC_KEY_TYPE.to_string(),
            id,
            transports,
        }
    }
}

/// `PublicKeyCredential` returned by `navigator.credentials.create()`
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: String, // base64url credential id
    pub response: AuthenticatorAttestationResponse,
    #[serde(default)]
    pub authenticator_attachment: Option<String>,
    #[serde(default)]
    pub client_extension_results: Option<serde_json::Value>,
    #[serde(rename = "type", default = "public_key_type")]
    pub r#type: String,
}

/// `PublicKeyCredential` returned by `navigator.credentials.get()`
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub id: String,
    pub raw_id: String, // base64url credential id
    pub response: AuthenticatorAssertionResponse,
    #[serde(default)]
    pub authenticator_attachment: Option<String>,
    #[serde(default)]
    pub client_extension_results: Option<serde_json::Value>,
    #[serde(rename = "type", default = "public_key_type")]
    pub r#type: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(default)]
    pub transports: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default)]
    pub user_handle: Option<String>,
}

fn public_key_type() -> String {
    PUBLIC_KEY_TYPE.to_string()
}

impl RegistrationResponse {
    /// Decode `rawId`
    ///
    /// # Errors
    /// Returns an error if `rawId` is not base64url
    pub fn credential_id(&self) -> Result<CredentialId, base64::DecodeError> {
        encoding::decode(&self.raw_id).map(CredentialId::new)
    }
}

impl AuthenticationResponse {
    /// Decode `rawId`
    ///
    /// # Errors
    /// Returns an error if `rawId` is not base64url
    pub fn credential_id(&self) -> Result<CredentialId, base64::DecodeError> {
        encoding::decode(&self.raw_id).map(CredentialId::new)
    }
}
