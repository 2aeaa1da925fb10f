//! Mock collaborators for testing
//!
//! [`FlakyStore`] injects storage failures per login; [`GatedVerifier`] parks
//! authentication checks so tests can interleave ceremonies deterministically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;

use crate::error::{StoreError, VerificationError};
use crate::models::{Credential, CredentialId, PendingChallenge, User};
use crate::store::{CredentialStore, InMemoryStore};
use crate::verifier::{
    AssertionResult, AuthenticationChallengeParams, AuthenticationExpectations,
    CredentialVerifier, RegistrationChallengeParams, RegistrationExpectations, Verdict,
    VerifiedCredential,
};
use crate::webauthn::{
    AuthenticationOptions, AuthenticationResponse, RegistrationOptions, RegistrationResponse,
};

/// In-memory store that fails on demand
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    failing_logins: Mutex<HashSet<String>>,
    fail_everything: AtomicBool,
}

impl FlakyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call touching `login` fail
    pub fn fail_for(&self, login: &str) {
        self.failing_logins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(login.to_string());
    }

    /// Make every call fail, including ones keyed by credential id
    pub fn fail_all(&self, fail: bool) {
        self.fail_everything.store(fail, Ordering::SeqCst);
    }

    /// Stop failing calls for `login`
    pub fn recover(&self, login: &str) {
        self.failing_logins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(login);
    }

    fn check(&self, login: Option<&str>) -> Result<(), StoreError> {
        let failing = self.fail_everything.load(Ordering::SeqCst)
            || login.is_some_and(|login| {
                self.failing_logins
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .contains(login)
            });
        if failing {
            Err(StoreError::Io(std::io::Error::other("injected store failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CredentialStore for FlakyStore {
    async fn get_or_create_user(&self, login: &str) -> Result<User, StoreError> {
        self.check(Some(login))?;
        self.inner.get_or_create_user(login).await
    }

    async fn get_user(&self, login: &str) -> Result<Option<User>, StoreError> {
        self.check(Some(login))?;
        self.inner.get_user(login).await
    }

    async fn set_pending_challenge(
        &self,
        login: &str,
        challenge: PendingChallenge,
    ) -> Result<(), StoreError> {
        self.check(Some(login))?;
        self.inner.set_pending_challenge(login, challenge).await
    }

    async fn consume_pending_challenge(
        &self,
        login: &str,
    ) -> Result<Option<PendingChallenge>, StoreError> {
        self.check(Some(login))?;
        self.inner.consume_pending_challenge(login).await
    }

    async fn append_credential(
        &self,
        login: &str,
        credential: Credential,
    ) -> Result<bool, StoreError> {
        self.check(Some(login))?;
        self.inner.append_credential(login, credential).await
    }

    async fn update_credential_counter(
        &self,
        credential_id: &CredentialId,
        new_counter: u32,
    ) -> Result<(), StoreError> {
        self.check(None)?;
        self.inner
            .update_credential_counter(credential_id, new_counter)
            .await
    }

    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.check(None)?;
        self.inner.purge_expired_challenges(now).await
    }
}

/// Verifier that can park the next authentication checks until released
pub struct GatedVerifier {
    inner: Arc<dyn CredentialVerifier>,
    to_hold: AtomicUsize,
    held: AtomicUsize,
    gate: Semaphore,
}

impl GatedVerifier {
    #[must_use]
    pub fn new(inner: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            inner,
            to_hold: AtomicUsize::new(0),
            held: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        }
    }

    /// Park the next `count` authentication checks
    pub fn hold_next_authentications(&self, count: usize) {
        self.to_hold.store(count, Ordering::SeqCst);
    }

    /// Number of checks parked so far
    #[must_use]
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    /// Wait until `count` checks are parked
    pub async fn wait_for_held(&self, count: usize) {
        while self.held() < count {
            tokio::task::yield_now().await;
        }
    }

    /// Let every parked check continue
    pub fn release(&self) {
        self.gate.add_permits(self.held());
    }
}

#[async_trait]
impl CredentialVerifier for GatedVerifier {
    fn make_registration_challenge(
        &self,
        params: RegistrationChallengeParams,
    ) -> Result<RegistrationOptions, VerificationError> {
        self.inner.make_registration_challenge(params)
    }

    async fn check_registration_response(
        &self,
        response: &RegistrationResponse,
        expected: &RegistrationExpectations,
    ) -> Result<Verdict<VerifiedCredential>, VerificationError> {
        self.inner
            .check_registration_response(response, expected)
            .await
    }

    fn make_authentication_challenge(
        &self,
        params: AuthenticationChallengeParams,
    ) -> Result<AuthenticationOptions, VerificationError> {
        self.inner.make_authentication_challenge(params)
    }

    async fn check_authentication_response(
        &self,
        response: &AuthenticationResponse,
        expected: &AuthenticationExpectations,
    ) -> Result<Verdict<AssertionResult>, VerificationError> {
        let hold = self
            .to_hold
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hold {
            self.held.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }

        self.inner
            .check_authentication_response(response, expected)
            .await
    }
}
