//! `WebAuthn` assertion processing

use super::authenticator_data::AuthenticatorData;
use super::cbor;
use super::client_data::{self, TYPE_GET};
use super::crypto;
use super::types::AuthenticationResponse;
use crate::error::VerificationError;
use crate::utils::encoding;
use crate::verifier::{counter_is_valid, AssertionResult, AuthenticationExpectations};

/// Verify an assertion against the stored credential
///
/// # Arguments
/// * `response` - The `WebAuthn` authentication response
/// * `expected` - Challenge, origin, RP ID, policy and the stored credential
///
/// # Errors
/// Returns the first failed check, including `CounterRegression` when the
/// signature counter did not advance
pub fn verify_assertion(
    response: &AuthenticationResponse,
    expected: &AuthenticationExpectations,
) -> Result<AssertionResult, VerificationError> {
    let credential = &expected.credential;

    let raw_id = encoding::decode(&response.raw_id)?;
    if raw_id != credential.id.as_bytes() {
        return Err(VerificationError::AuthenticatorData(
            "assertion was made with a different credential".to_string(),
        ));
    }

    // Optional for non-discoverable credentials; some clients send it empty
    if let Some(handle) = response.response.user_handle.as_deref().filter(|h| !h.is_empty()) {
        if encoding::decode(handle)? != expected.user_handle.as_bytes() {
            return Err(VerificationError::UserHandleMismatch);
        }
    }

    let client_data_json = encoding::decode(&response.response.client_data_json)?;
    client_data::verify_client_data(
        &client_data_json,
        TYPE_GET,
        &expected.challenge,
        &expected.origin,
    )?;

    let auth_data_bytes = encoding::decode(&response.response.authenticator_data)?;
    let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
    auth_data.check(
        &crypto::sha256(expected.rp_id.as_bytes()),
        expected.require_user_verification,
    )?;

    let key = cbor::parse_cose_key(&credential.public_key)?;
    let signature = encoding::decode(&response.response.signature)?;
    let message = crypto::signed_message(&auth_data_bytes, &client_data_json);
    crypto::verify_signature(&key, &message, &signature)?;

    if !counter_is_valid(credential.counter, auth_data.counter) {
        return Err(VerificationError::CounterRegression {
            stored: credential.counter,
            received: auth_data.counter,
        });
    }

    Ok(AssertionResult {
        credential_id: credential.id.clone(),
        new_counter: auth_data.counter,
        user_verified: auth_data.user_verified(),
    })
}
