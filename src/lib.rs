#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! WebAuthn relying-party ceremony coordinator
//!
//! [`CeremonyCoordinator`] drives passkey registration and authentication:
//! it issues single-use challenges, matches client responses to stored
//! credentials and enforces the signature counter rule. Cryptographic checks
//! and persistence are injected as [`CredentialVerifier`] and
//! [`CredentialStore`] implementations.

/// Version of the passkey-rp library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ceremony;
pub mod error;
pub mod models;
pub mod settings;
pub mod store;
pub mod utils;
pub mod verifier;
pub mod webauthn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use ceremony::{CeremonyCoordinator, CeremonyOutcome};
pub use error::{CeremonyError, SettingsError, StoreError, VerificationError};
pub use models::{
    AuthenticatorTransport, CeremonyKind, Challenge, Credential, CredentialId, PendingChallenge,
    User, UserHandle,
};
pub use settings::Settings;
pub use store::{CredentialStore, InMemoryStore, JsonFileStore};
pub use verifier::{CredentialVerifier, Verdict};
pub use webauthn::WebAuthnVerifier;
