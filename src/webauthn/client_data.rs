//! Collected client data checks

use serde::Deserialize;

use crate::error::VerificationError;
use crate::models::Challenge;
use crate::utils::encoding;

pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

/// `CollectedClientData` as serialized by the browser
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub r#type: String,
    pub challenge: String,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: Option<bool>,
}

/// Verify decoded client data JSON
///
/// # Arguments
/// * `client_data_json` - Raw `clientDataJSON` bytes
/// * `expected_type` - `webauthn.create` or `webauthn.get`
/// * `expected_challenge` - Challenge issued for this ceremony
/// * `expected_origin` - Exact origin the ceremony must come from
///
/// # Errors
/// Returns `VerificationError::ClientData` when any field does not match or
/// the ceremony ran in a cross-origin frame
pub fn verify_client_data(
    client_data_json: &[u8],
    expected_type: &str,
    expected_challenge: &Challenge,
    expected_origin: &str,
) -> Result<CollectedClientData, VerificationError> {
    let client_data: CollectedClientData = serde_json::from_slice(client_data_json)
        .map_err(|e| VerificationError::Encoding(format!("invalid client data JSON: {e}")))?;

    if client_data.r#type != expected_type {
        return Err(VerificationError::ClientData(format!(
            "unexpected type `{}`, expected {expected_type}",
            client_data.r#type
        )));
    }

    // Some clients pad the challenge, so compare the decoded bytes
    let challenge = encoding::decode(&client_data.challenge)
        .map_err(|_| VerificationError::ClientData("challenge is not base64url".to_string()))?;
    if challenge != expected_challenge.as_bytes() {
        return Err(VerificationError::ClientData("challenge mismatch".to_string()));
    }

    if client_data.origin != expected_origin {
        return Err(VerificationError::ClientData(format!(
            "origin mismatch: {}",
            client_data.origin
        )));
    }

    // Ceremonies embedded in a third-party iframe are not supported
    if client_data.cross_origin == Some(true) {
        return Err(VerificationError::ClientData(
            "cross-origin ceremonies are not accepted".to_string(),
        ));
    }

    Ok(client_data)
}
