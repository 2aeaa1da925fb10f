//! `WebAuthn` attestation processing
//!
//! Verifies registration responses. Only `none` and `packed` self-attestation
//! are accepted; certificate chains are not evaluated.

use super::authenticator_data::AuthenticatorData;
use super::cbor::{self, AttestationObject, CoseKey};
use super::client_data::{self, TYPE_CREATE};
use super::crypto;
use super::types::RegistrationResponse;
use crate::error::VerificationError;
use crate::models::{AuthenticatorTransport, CredentialId};
use crate::utils::encoding;
use crate::verifier::{RegistrationExpectations, VerifiedCredential};

/// Verify a registration response and extract the new credential
///
/// # Arguments
/// * `response` - The `WebAuthn` registration response
/// * `expected` - Challenge, origin, RP ID and policy the response must satisfy
///
/// # Errors
/// Returns the first failed check
pub fn verify_registration(
    response: &RegistrationResponse,
    expected: &RegistrationExpectations,
) -> Result<VerifiedCredential, VerificationError> {
    let raw_id = CredentialId::new(encoding::decode(&response.raw_id)?);
    let client_data_json = encoding::decode(&response.response.client_data_json)?;
    client_data::verify_client_data(
        &client_data_json,
        TYPE_CREATE,
        &expected.challenge,
        &expected.origin,
    )?;

    let attestation_bytes = encoding::decode(&response.response.attestation_object)?;
    let attestation = cbor::parse_attestation_object(&attestation_bytes)?;

    let auth_data = AuthenticatorData::parse(&attestation.auth_data)?;
    auth_data.check(
        &crypto::sha256(expected.rp_id.as_bytes()),
        expected.require_user_verification,
    )?;

    let Some(attested) = auth_data.attested_credential.as_ref() else {
        return Err(VerificationError::AuthenticatorData(
            "no attested credential data".to_string(),
        ));
    };
    if attested.credential_id != raw_id.as_bytes() {
        return Err(VerificationError::AuthenticatorData(
            "attested credential ID does not match rawId".to_string(),
        ));
    }

    let key = cbor::parse_cose_key(&attested.public_key)?;
    if !expected.algorithms.contains(&key.algorithm()) {
        return Err(VerificationError::UnsupportedAlgorithm(key.algorithm()));
    }

    verify_statement(&attestation, &key, &client_data_json)?;

    Ok(VerifiedCredential {
        id: raw_id,
        public_key: attested.public_key.clone(),
        counter: auth_data.counter,
        algorithm: key.algorithm(),
        transports: AuthenticatorTransport::parse_hints(&response.response.transports)
            .into_iter()
            .collect(),
    })
}

fn verify_statement(
    attestation: &AttestationObject,
    key: &CoseKey,
    client_data_json: &[u8],
) -> Result<(), VerificationError> {
    match attestation.fmt.as_str() {
        "none" => {
            if attestation.att_stmt.is_empty() {
                Ok(())
            } else {
                Err(VerificationError::Attestation(
                    "none attestation must have an empty statement".to_string(),
                ))
            }
        }
        "packed" => verify_packed_self_attestation(attestation, key, client_data_json),
        other => Err(VerificationError::Attestation(format!(
            "unsupported attestation format `{other}`"
        ))),
    }
}

/// Packed self-attestation: the credential key signs its own registration
fn verify_packed_self_attestation(
    attestation: &AttestationObject,
    key: &CoseKey,
    client_data_json: &[u8],
) -> Result<(), VerificationError> {
    if attestation.statement("x5c").is_some() {
        return Err(VerificationError::Attestation(
            "packed attestation with a certificate chain is not supported".to_string(),
        ));
    }

    let Some(alg) = attestation.statement("alg").and_then(cbor::as_i64) else {
        return Err(VerificationError::Attestation("packed statement missing alg".to_string()));
    };
    if alg != key.algorithm() {
        return Err(VerificationError::Attestation(
            "packed statement alg does not match credential key".to_string(),
        ));
    }

    let Some(sig) = attestation.statement("sig").and_then(|v| v.as_bytes()) else {
        return Err(VerificationError::Attestation("packed statement missing sig".to_string()));
    };

    let message = crypto::signed_message(&attestation.auth_data, client_data_json);
    crypto::verify_signature(key, &message, sig)
}
