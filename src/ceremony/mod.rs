//! Ceremony coordinator
//!
//! Owns the per-user challenge lifecycle for WebAuthn registration and
//! authentication:
//!
//! ```text
//! NoChallenge --begin--> ChallengeIssued --finish--> Verified | Rejected
//!      ^                                                   |
//!      +---------------------------------------------------+
//! ```
//!
//! Every finish call consumes the pending challenge whatever its outcome, and
//! a new begin call overwrites an unconsumed one. Store mutations for one user
//! are serialized by [`UserLocks`]; response verification runs outside the
//! lock against a snapshot.

mod authentication;
mod locks;
mod registration;

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub use locks::{UserLockGuard, UserLocks};

use crate::error::CeremonyError;
use crate::models::{CeremonyKind, Challenge, CredentialId, PendingChallenge, User};
use crate::settings::Settings;
use crate::store::CredentialStore;
use crate::utils::logging::LoggingHelper;
use crate::verifier::CredentialVerifier;

/// Result of a finish call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CeremonyOutcome {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<CredentialId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CeremonyOutcome {
    #[must_use]
    pub fn verified(credential_id: CredentialId) -> Self {
        Self {
            verified: true,
            credential_id: Some(credential_id),
            reason: None,
        }
    }

    #[must_use]
    pub fn rejected(credential_id: Option<CredentialId>, reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            credential_id,
            reason: Some(reason.into()),
        }
    }

    /// Convert into the verified credential id, for callers that prefer `?`
    ///
    /// # Errors
    /// Returns `CeremonyError::VerificationFailed` with the rejection reason
    pub fn into_result(self) -> Result<CredentialId, CeremonyError> {
        match (self.verified, self.credential_id) {
            (true, Some(credential_id)) => Ok(credential_id),
            _ => Err(CeremonyError::VerificationFailed(
                self.reason.unwrap_or_else(|| "not verified".to_string()),
            )),
        }
    }
}

/// Coordinates WebAuthn ceremonies against injected collaborators
pub struct CeremonyCoordinator {
    settings: Settings,
    store: Arc<dyn CredentialStore>,
    verifier: Arc<dyn CredentialVerifier>,
    locks: UserLocks,
}

impl CeremonyCoordinator {
    #[must_use]
    pub fn new(
        settings: Settings,
        store: Arc<dyn CredentialStore>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            settings,
            store,
            verifier,
            locks: UserLocks::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Drop every expired pending challenge
    ///
    /// # Errors
    /// Returns `CeremonyError::StoreUnavailable` if the store fails
    pub async fn sweep_expired_challenges(&self) -> Result<usize, CeremonyError> {
        Ok(self.store.purge_expired_challenges(Utc::now()).await?)
    }

    /// Run [`Self::sweep_expired_challenges`] every `period` until the handle is aborted
    #[must_use]
    pub fn spawn_challenge_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let period = period.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match coordinator.sweep_expired_challenges().await {
                    Ok(0) => {}
                    Ok(purged) => log::debug!("Swept {purged} expired challenges"),
                    Err(e) => log::warn!("Challenge sweep failed: {e}"),
                }
            }
        })
    }

    /// Issue a pending challenge of `kind` for `login`
    async fn store_challenge(
        &self,
        login: &str,
        challenge: Challenge,
        kind: CeremonyKind,
    ) -> Result<(), CeremonyError> {
        let pending = PendingChallenge::new(challenge, kind, self.settings.ceremony.challenge_ttl());
        self.store.set_pending_challenge(login, pending).await?;
        LoggingHelper::log_challenge_issued(login, kind);
        Ok(())
    }

    /// Consume the user's pending challenge and check it belongs to `kind`
    ///
    /// Returns the user snapshot taken under the lock together with the challenge.
    async fn take_challenge(
        &self,
        login: &str,
        kind: CeremonyKind,
    ) -> Result<(User, PendingChallenge), CeremonyError> {
        let _guard = self.locks.lock(login).await;

        let Some(user) = self.store.get_user(login).await? else {
            return Err(CeremonyError::UserNotFound(login.to_string()));
        };
        let Some(pending) = self.store.consume_pending_challenge(login).await? else {
            return Err(CeremonyError::NoPendingChallenge(kind));
        };

        if pending.kind != kind {
            log::debug!("Discarding {} challenge for {login} on {kind} finish", pending.kind);
            return Err(CeremonyError::NoPendingChallenge(kind));
        }
        if pending.is_expired_at(Utc::now()) {
            log::debug!("Discarding expired {kind} challenge for {login}");
            return Err(CeremonyError::NoPendingChallenge(kind));
        }

        Ok((user, pending))
    }
}

/// Trim a login and reject empty or control-character input
pub(crate) fn normalize_login(login: &str) -> Result<String, CeremonyError> {
    let login = login.trim();
    if login.is_empty() {
        return Err(CeremonyError::InvalidInput("login must not be empty".to_string()));
    }
    if login.chars().any(char::is_control) {
        return Err(CeremonyError::InvalidInput(
            "login must not contain control characters".to_string(),
        ));
    }
    Ok(login.to_string())
}
