//! Credential verifier abstraction
//!
//! The ceremony coordinator never touches WebAuthn cryptography directly. It
//! asks a [`CredentialVerifier`] to build challenge requests and to judge the
//! client's responses against what it expected.

use async_trait::async_trait;

use crate::error::VerificationError;
use crate::models::{AuthenticatorTransport, Challenge, Credential, CredentialId, UserHandle};
use crate::webauthn::{
    AuthenticationOptions, AuthenticationResponse, PublicKeyCredentialDescriptor,
    RegistrationOptions, RegistrationResponse, ResidentKeyPolicy, UserVerificationPolicy,
};

/// Outcome of checking a client response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T> {
    /// Response verified; carries the parsed credential material
    Verified(T),
    /// Response was well formed but failed a check
    Rejected(String),
}

/// Inputs for a registration challenge request
#[derive(Debug, Clone)]
pub struct RegistrationChallengeParams {
    pub rp_id: String,
    pub rp_name: String,
    pub user_handle: UserHandle,
    pub user_name: String,
    pub display_name: String,
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub resident_key: ResidentKeyPolicy,
    pub user_verification: UserVerificationPolicy,
    pub algorithms: Vec<i64>,
    pub timeout_ms: u64,
}

/// Inputs for an authentication challenge request
#[derive(Debug, Clone)]
pub struct AuthenticationChallengeParams {
    pub rp_id: String,
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub user_verification: UserVerificationPolicy,
    pub timeout_ms: u64,
}

/// What a registration response must match
#[derive(Debug, Clone)]
pub struct RegistrationExpectations {
    pub challenge: Challenge,
    pub origin: String,
    pub rp_id: String,
    pub require_user_verification: bool,
    /// COSE algorithms the relying party accepts
    pub algorithms: Vec<i64>,
}

/// What an authentication response must match
#[derive(Debug, Clone)]
pub struct AuthenticationExpectations {
    pub challenge: Challenge,
    pub origin: String,
    pub rp_id: String,
    pub require_user_verification: bool,
    /// Handle of the account being authenticated
    pub user_handle: UserHandle,
    /// Snapshot of the stored credential the response claims to use
    pub credential: Credential,
}

/// Credential material extracted from a verified registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub id: CredentialId,
    pub public_key: Vec<u8>,
    pub counter: u32,
    pub algorithm: i64,
    pub transports: Vec<AuthenticatorTransport>,
}

/// Result of a verified assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionResult {
    pub credential_id: CredentialId,
    pub new_counter: u32,
    pub user_verified: bool,
}

/// Signature counter rule
///
/// A counter must strictly increase, except for authenticators that never
/// implement one and always report zero.
#[must_use]
pub fn counter_is_valid(stored: u32, received: u32) -> bool {
    received > stored || (received == 0 && stored == 0)
}

/// Builds WebAuthn challenge requests and checks client responses
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Build `PublicKeyCredentialCreationOptions` with a fresh challenge
    ///
    /// # Errors
    /// Returns an error if a challenge cannot be generated
    fn make_registration_challenge(
        &self,
        params: RegistrationChallengeParams,
    ) -> Result<RegistrationOptions, VerificationError>;

    /// Check an attestation response
    ///
    /// # Errors
    /// Returns an error when the response cannot be decoded at all
    async fn check_registration_response(
        &self,
        response: &RegistrationResponse,
        expected: &RegistrationExpectations,
    ) -> Result<Verdict<VerifiedCredential>, VerificationError>;

    /// Build `PublicKeyCredentialRequestOptions` with a fresh challenge
    ///
    /// # Errors
    /// Returns an error if a challenge cannot be generated
    fn make_authentication_challenge(
        &self,
        params: AuthenticationChallengeParams,
    ) -> Result<AuthenticationOptions, VerificationError>;

    /// Check an assertion response against the stored credential
    ///
    /// # Errors
    /// Returns an error when the response cannot be decoded at all
    async fn check_authentication_response(
        &self,
        response: &AuthenticationResponse,
        expected: &AuthenticationExpectations,
    ) -> Result<Verdict<AssertionResult>, VerificationError>;
}
