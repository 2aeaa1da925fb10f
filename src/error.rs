use thiserror::Error;

use crate::models::CeremonyKind;

/// Errors surfaced by the ceremony coordinator
///
/// Verification rejections are not errors; they come back as a
/// [`crate::ceremony::CeremonyOutcome`] with `verified: false`.
#[derive(Debug, Error)]
pub enum CeremonyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("user has no registered credentials: {0}")]
    UserNotRegistered(String),

    #[error("no pending {0} challenge")]
    NoPendingChallenge(CeremonyKind),

    #[error("authenticator is not registered for this user")]
    AuthenticatorNotRegistered,

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("credential store unavailable")]
    StoreUnavailable(#[source] StoreError),
}

impl From<StoreError> for CeremonyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(login) => CeremonyError::UserNotFound(login),
            other => CeremonyError::StoreUnavailable(other),
        }
    }
}

/// Errors raised by credential store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    #[error("credential {0} is registered to another user")]
    DuplicateCredential(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store is corrupt: {0}")]
    Corrupt(String),
}

/// Errors raised while building or checking WebAuthn payloads
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("malformed encoding: {0}")]
    Encoding(String),

    #[error("client data rejected: {0}")]
    ClientData(String),

    #[error("authenticator data rejected: {0}")]
    AuthenticatorData(String),

    #[error("attestation rejected: {0}")]
    Attestation(String),

    #[error("unsupported COSE algorithm {0}")]
    UnsupportedAlgorithm(i64),

    #[error("signature verification failed")]
    BadSignature,

    #[error("signature counter did not advance (stored {stored}, received {received})")]
    CounterRegression { stored: u32, received: u32 },

    #[error("user presence flag not set")]
    UserNotPresent,

    #[error("user verification required but not performed")]
    UserNotVerified,

    #[error("user handle does not belong to the account")]
    UserHandleMismatch,

    #[error("failed to generate challenge")]
    ChallengeGeneration,
}

impl From<base64::DecodeError> for VerificationError {
    fn from(err: base64::DecodeError) -> Self {
        VerificationError::Encoding(err.to_string())
    }
}

/// Invalid configuration detected by [`crate::settings::Settings::validate`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("rp_origin is not a valid URL: {0}")]
    InvalidOrigin(String),

    #[error("rp_origin host `{host}` is not within rp_id `{rp_id}`")]
    OriginOutsideRpId { host: String, rp_id: String },

    #[error("ceremony.algorithms must not be empty")]
    NoAlgorithms,

    #[error("ceremony.challenge_timeout_seconds must be greater than zero")]
    ZeroTimeout,

    #[error("ceremony.challenge_timeout_seconds must be at most {max}")]
    TimeoutTooLong { max: u64 },

    #[error("storage.path is required for the file backend")]
    MissingStorePath,
}
