//! Native `WebAuthn` verifier
//!
//! Implements [`CredentialVerifier`] with `ring` and `ciborium`.

use async_trait::async_trait;
use ring::rand::SystemRandom;

use super::assertion;
use super::attestation;
use super::crypto;
use super::types::{
    AuthenticationOptions, AuthenticationResponse, AuthenticatorSelectionCriteria,
    PublicKeyCredentialParameters, RegistrationOptions, RegistrationResponse, RelyingParty,
    ResidentKeyPolicy, UserEntity,
};
use crate::error::VerificationError;
use crate::verifier::{
    AssertionResult, AuthenticationChallengeParams, AuthenticationExpectations,
    CredentialVerifier, RegistrationChallengeParams, RegistrationExpectations, Verdict,
    VerifiedCredential,
};

/// Attestation conveyance requested from authenticators
const ATTESTATION_NONE: &str = "none";

/// Core `WebAuthn` verifier
pub struct WebAuthnVerifier {
    rng: SystemRandom,
}

impl Default for WebAuthnVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WebAuthnVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

/// Split verification failures into rejections and hard errors
///
/// Undecodable payloads and RNG failures are errors; every other failed check
/// is a rejection with a human-readable reason.
fn into_verdict<T>(result: Result<T, VerificationError>) -> Result<Verdict<T>, VerificationError> {
    match result {
        Ok(value) => Ok(Verdict::Verified(value)),
        Err(err @ (VerificationError::Encoding(_) | VerificationError::ChallengeGeneration)) => {
            Err(err)
        }
        Err(err) => {
            if let VerificationError::CounterRegression { stored, received } = err {
                log::warn!(
                    "Signature counter went from {stored} to {received}, the authenticator may be cloned"
                );
            }
            Ok(Verdict::Rejected(err.to_string()))
        }
    }
}

#[async_trait]
impl CredentialVerifier for WebAuthnVerifier {
    fn make_registration_challenge(
        &self,
        params: RegistrationChallengeParams,
    ) -> Result<RegistrationOptions, VerificationError> {
        let challenge = crypto::generate_challenge(&self.rng)?;

        Ok(RegistrationOptions {
            challenge,
            rp: RelyingParty {
                id: params.rp_id,
                name: params.rp_name,
            },
            user: UserEntity {
                id: params.user_handle,
                name: params.user_name,
                display_name: params.display_name,
            },
            pub_key_cred_params: params
                .algorithms
                .into_iter()
                .map(PublicKeyCredentialParameters::public_key)
                .collect(),
            timeout: params.timeout_ms,
            attestation: ATTESTATION_NONE.to_string(),
            exclude_credentials: params.exclude_credentials,
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: None,
                resident_key: params.resident_key,
                require_resident_key: params.resident_key == ResidentKeyPolicy::Required,
                user_verification: params.user_verification,
            },
        })
    }

    async fn check_registration_response(
        &self,
        response: &RegistrationResponse,
        expected: &RegistrationExpectations,
    ) -> Result<Verdict<VerifiedCredential>, VerificationError> {
        into_verdict(attestation::verify_registration(response, expected))
    }

    fn make_authentication_challenge(
        &self,
        params: AuthenticationChallengeParams,
    ) -> Result<AuthenticationOptions, VerificationError> {
        let challenge = crypto::generate_challenge(&self.rng)?;

        Ok(AuthenticationOptions {
            challenge,
            timeout: params.timeout_ms,
            rp_id: params.rp_id,
            allow_credentials: params.allow_credentials,
            user_verification: params.user_verification,
        })
    }

    async fn check_authentication_response(
        &self,
        response: &AuthenticationResponse,
        expected: &AuthenticationExpectations,
    ) -> Result<Verdict<AssertionResult>, VerificationError> {
        into_verdict(assertion::verify_assertion(response, expected))
    }
}
