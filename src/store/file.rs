use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use super::memory::MemoryState;
use super::CredentialStore;
use crate::error::StoreError;
use crate::models::{Credential, CredentialId, PendingChallenge, User};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    users: Vec<&'a User>,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    users: Vec<User>,
}

/// Credential store persisted as a JSON snapshot on disk
///
/// Every mutation is applied to a copy of the state, written to a temporary
/// file and renamed over the snapshot. Only then does the copy replace the
/// live state, so a failed write leaves both disk and memory untouched.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<MemoryState>,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the snapshot at `path`, starting empty if the file does not exist
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(StoreError::Corrupt(format!(
                        "unsupported snapshot version {}",
                        snapshot.version
                    )));
                }
                log::debug!(
                    "Loaded {} users from {}",
                    snapshot.users.len(),
                    path.display()
                );
                MemoryState::from_users(snapshot.users)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No credential snapshot at {}, starting empty", path.display());
                MemoryState::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &MemoryState) -> Result<(), StoreError> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            users: state.users(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        // the rename only replaces the snapshot once the new bytes are durable
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `op` to a copy of the state and commit it once the snapshot is on disk
    ///
    /// Nothing is written when `op` fails or reports no change.
    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut MemoryState) -> Result<(T, bool), StoreError> + Send,
    ) -> Result<T, StoreError>
    where
        T: Send,
    {
        let _guard = self.write_lock.lock().await;

        let mut next = self.state.read().await.clone();
        let (value, changed) = op(&mut next)?;
        if changed {
            self.persist(&next).await?;
            *self.state.write().await = next;
        }
        Ok(value)
    }
}

#[async_trait]
impl CredentialStore for JsonFileStore {
    async fn get_or_create_user(&self, login: &str) -> Result<User, StoreError> {
        if let Some(user) = self.state.read().await.get_user(login) {
            return Ok(user);
        }
        self.mutate(|state| {
            let created = !state.contains_user(login);
            Ok((state.get_or_create_user(login), created))
        })
        .await
    }

    async fn get_user(&self, login: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.get_user(login))
    }

    async fn set_pending_challenge(
        &self,
        login: &str,
        challenge: PendingChallenge,
    ) -> Result<(), StoreError> {
        self.mutate(|state| Ok((state.set_pending_challenge(login, challenge)?, true)))
            .await
    }

    async fn consume_pending_challenge(
        &self,
        login: &str,
    ) -> Result<Option<PendingChallenge>, StoreError> {
        self.mutate(|state| {
            let pending = state.consume_pending_challenge(login)?;
            let changed = pending.is_some();
            Ok((pending, changed))
        })
        .await
    }

    async fn append_credential(
        &self,
        login: &str,
        credential: Credential,
    ) -> Result<bool, StoreError> {
        self.mutate(|state| {
            let appended = state.append_credential(login, credential)?;
            Ok((appended, appended))
        })
        .await
    }

    async fn update_credential_counter(
        &self,
        credential_id: &CredentialId,
        new_counter: u32,
    ) -> Result<(), StoreError> {
        self.mutate(|state| {
            Ok((
                state.update_credential_counter(credential_id, new_counter)?,
                true,
            ))
        })
        .await
    }

    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.mutate(|state| {
            let purged = state.purge_expired_challenges(now);
            Ok((purged, purged > 0))
        })
        .await
    }
}
