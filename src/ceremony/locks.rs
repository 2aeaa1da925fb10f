use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

type UserLock = Arc<tokio::sync::Mutex<()>>;

/// Per-user async mutexes keyed by login
///
/// Entries are created on demand and dropped once no task holds or waits on
/// them, so the map only ever contains logins with a ceremony in flight.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, UserLock>>,
}

/// Held while mutating one user's state
pub struct UserLockGuard<'a> {
    owner: &'a UserLocks,
    login: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl UserLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `login`
    pub async fn lock(&self, login: &str) -> UserLockGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(login.to_string()).or_default())
        };
        let guard = lock.lock_owned().await;

        UserLockGuard {
            owner: self,
            login: login.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of logins currently tracked
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, login: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // the map holds one reference; any other means a task holds or awaits the lock
        if locks
            .get(login)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(login);
        }
    }
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        // release the mutex before checking whether the entry is idle
        drop(self.guard.take());
        self.owner.release(&self.login);
    }
}
