// Centralized logging for ceremony events. Lines carry the login and the
// base64url credential id, never challenge bytes or key material.
use log::{debug, info, warn};

use crate::models::{CeremonyKind, CredentialId};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log a freshly issued challenge
    pub fn log_challenge_issued(login: &str, kind: CeremonyKind) {
        debug!("Issued {kind} challenge for {login}");
    }

    /// Log a newly stored credential
    pub fn log_credential_registered(login: &str, credential_id: &CredentialId) {
        info!("✅ Registered credential {credential_id} for {login}");
    }

    /// Log a successful assertion
    pub fn log_authenticated(login: &str, credential_id: &CredentialId, counter: u32) {
        info!("✅ Authenticated {login} with credential {credential_id} (counter {counter})");
    }

    /// Log a response that failed verification
    pub fn log_ceremony_rejected(login: &str, kind: CeremonyKind, reason: &str) {
        warn!("❌ Rejected {kind} response for {login}: {reason}");
    }

    /// Log a counter that failed to advance, which usually means a cloned authenticator
    pub fn log_counter_regression(
        login: &str,
        credential_id: &CredentialId,
        stored: u32,
        received: u32,
    ) {
        warn!(
            "⚠️  Signature counter for credential {credential_id} of {login} went from {stored} to {received}, possible cloned authenticator"
        );
    }
}
