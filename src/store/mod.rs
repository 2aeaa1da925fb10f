//! Credential store abstraction
//!
//! A store maps logins to [`User`] records, enforces global uniqueness of
//! credential ids and holds each user's pending challenge.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{Credential, CredentialId, PendingChallenge, User};

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;

/// Durable mapping from login to user record
///
/// Implementations must be safe to share across tasks. The coordinator
/// serializes mutations per user, so a store only needs to keep each single
/// call atomic.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Return the user for `login`, creating an empty account on first sight
    ///
    /// # Errors
    /// Returns an error if the backing storage fails
    async fn get_or_create_user(&self, login: &str) -> Result<User, StoreError>;

    /// # Errors
    /// Returns an error if the backing storage fails
    async fn get_user(&self, login: &str) -> Result<Option<User>, StoreError>;

    /// Replace the user's pending challenge
    ///
    /// # Errors
    /// Returns `StoreError::UserNotFound` for unknown logins
    async fn set_pending_challenge(
        &self,
        login: &str,
        challenge: PendingChallenge,
    ) -> Result<(), StoreError>;

    /// Take the user's pending challenge, leaving none behind
    ///
    /// # Errors
    /// Returns `StoreError::UserNotFound` for unknown logins
    async fn consume_pending_challenge(
        &self,
        login: &str,
    ) -> Result<Option<PendingChallenge>, StoreError>;

    /// Append a credential to the user's list
    ///
    /// Returns `false` without changing anything when the user already owns
    /// the credential id.
    ///
    /// # Errors
    /// Returns `StoreError::DuplicateCredential` when another user owns the id
    async fn append_credential(&self, login: &str, credential: Credential)
        -> Result<bool, StoreError>;

    /// Store a new signature counter and stamp the credential as used
    ///
    /// # Errors
    /// Returns `StoreError::CredentialNotFound` for unknown ids
    async fn update_credential_counter(
        &self,
        credential_id: &CredentialId,
        new_counter: u32,
    ) -> Result<(), StoreError>;

    /// Drop every pending challenge that expired at or before `now`
    ///
    /// # Errors
    /// Returns an error if the backing storage fails
    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}
