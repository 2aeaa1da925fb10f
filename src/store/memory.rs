use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::CredentialStore;
use crate::error::StoreError;
use crate::models::{Credential, CredentialId, PendingChallenge, User};

/// Users plus a reverse index from credential id to owning login
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryState {
    users: HashMap<String, User>,
    credential_owners: HashMap<CredentialId, String>,
}

impl MemoryState {
    /// Rebuild state from a list of users, checking credential uniqueness
    pub(crate) fn from_users(users: Vec<User>) -> Result<Self, StoreError> {
        let mut state = Self::default();
        for user in users {
            for credential in &user.credentials {
                if let Some(owner) = state
                    .credential_owners
                    .insert(credential.id.clone(), user.login.clone())
                {
                    return Err(StoreError::Corrupt(format!(
                        "credential {} is listed under both {owner} and {}",
                        credential.id, user.login
                    )));
                }
            }
            if state.users.insert(user.login.clone(), user).is_some() {
                return Err(StoreError::Corrupt("duplicate login in snapshot".to_string()));
            }
        }
        Ok(state)
    }

    /// Users in login order
    pub(crate) fn users(&self) -> Vec<&User> {
        let mut users: Vec<&User> = self.users.values().collect();
        users.sort_by(|a, b| a.login.cmp(&b.login));
        users
    }

    pub(crate) fn get_user(&self, login: &str) -> Option<User> {
        self.users.get(login).cloned()
    }

    pub(crate) fn contains_user(&self, login: &str) -> bool {
        self.users.contains_key(login)
    }

    pub(crate) fn get_or_create_user(&mut self, login: &str) -> User {
        self.users
            .entry(login.to_string())
            .or_insert_with(|| {
                log::info!("Provisioned new account for {login}");
                User::new(login)
            })
            .clone()
    }

    fn user_mut(&mut self, login: &str) -> Result<&mut User, StoreError> {
        self.users
            .get_mut(login)
            .ok_or_else(|| StoreError::UserNotFound(login.to_string()))
    }

    pub(crate) fn set_pending_challenge(
        &mut self,
        login: &str,
        challenge: PendingChallenge,
    ) -> Result<(), StoreError> {
        self.user_mut(login)?.pending_challenge = Some(challenge);
        Ok(())
    }

    pub(crate) fn consume_pending_challenge(
        &mut self,
        login: &str,
    ) -> Result<Option<PendingChallenge>, StoreError> {
        Ok(self.user_mut(login)?.pending_challenge.take())
    }

    pub(crate) fn append_credential(
        &mut self,
        login: &str,
        credential: Credential,
    ) -> Result<bool, StoreError> {
        if !self.users.contains_key(login) {
            return Err(StoreError::UserNotFound(login.to_string()));
        }
        match self.credential_owners.get(&credential.id) {
            Some(owner) if owner == login => return Ok(false),
            Some(_) => return Err(StoreError::DuplicateCredential(credential.id.to_base64url())),
            None => {}
        }

        self.credential_owners
            .insert(credential.id.clone(), login.to_string());
        self.user_mut(login)?.credentials.push(credential);
        Ok(true)
    }

    pub(crate) fn update_credential_counter(
        &mut self,
        credential_id: &CredentialId,
        new_counter: u32,
    ) -> Result<(), StoreError> {
        let not_found = || StoreError::CredentialNotFound(credential_id.to_base64url());
        let owner = self.credential_owners.get(credential_id).ok_or_else(not_found)?.clone();
        let credential = self
            .user_mut(&owner)?
            .credentials
            .iter_mut()
            .find(|c| &c.id == credential_id)
            .ok_or_else(not_found)?;

        credential.counter = new_counter;
        credential.last_used_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn purge_expired_challenges(&mut self, now: DateTime<Utc>) -> usize {
        let mut purged = 0;
        for user in self.users.values_mut() {
            if user
                .pending_challenge
                .as_ref()
                .is_some_and(|pending| pending.is_expired_at(now))
            {
                user.pending_challenge = None;
                purged += 1;
            }
        }
        purged
    }
}

/// Process-lifetime credential store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn get_or_create_user(&self, login: &str) -> Result<User, StoreError> {
        Ok(self.state.write().await.get_or_create_user(login))
    }

    async fn get_user(&self, login: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.get_user(login))
    }

    async fn set_pending_challenge(
        &self,
        login: &str,
        challenge: PendingChallenge,
    ) -> Result<(), StoreError> {
        self.state.write().await.set_pending_challenge(login, challenge)
    }

    async fn consume_pending_challenge(
        &self,
        login: &str,
    ) -> Result<Option<PendingChallenge>, StoreError> {
        self.state.write().await.consume_pending_challenge(login)
    }

    async fn append_credential(
        &self,
        login: &str,
        credential: Credential,
    ) -> Result<bool, StoreError> {
        self.state.write().await.append_credential(login, credential)
    }

    async fn update_credential_counter(
        &self,
        credential_id: &CredentialId,
        new_counter: u32,
    ) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .update_credential_counter(credential_id, new_counter)
    }

    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.state.write().await.purge_expired_challenges(now))
    }
}
