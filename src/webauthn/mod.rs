//! `WebAuthn` implementation
//!
//! Wire types plus a native [`WebAuthnVerifier`] that checks client data,
//! authenticator data, attestation statements and assertion signatures using
//! standard cryptography libraries.

mod assertion;
mod attestation;
pub mod authenticator_data;
pub mod cbor;
pub mod client_data;
pub mod crypto;
mod service;
mod types;

// Re-exports for public use
pub use service::WebAuthnVerifier;
pub use types::*;
