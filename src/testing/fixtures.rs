//! Test fixtures providing pre-built test objects
//!
//! Settings, coordinators and complete ceremonies driven by a
//! [`SoftAuthenticator`], so tests only spell out the step they care about.

use std::sync::{Arc, OnceLock};

use super::authenticator::SoftAuthenticator;
use super::constants::{TEST_ORIGIN, TEST_RP_ID};
use crate::ceremony::{CeremonyCoordinator, CeremonyOutcome};
use crate::models::CredentialId;
use crate::settings::Settings;
use crate::store::{CredentialStore, InMemoryStore};
use crate::verifier::CredentialVerifier;
use crate::webauthn::WebAuthnVerifier;

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Settings matching the soft authenticator's origin and RP id
    #[must_use]
    pub fn settings() -> Settings {
        static SETTINGS: OnceLock<Settings> = OnceLock::new();
        SETTINGS
            .get_or_init(|| {
                let mut settings = Settings::default();
                settings.relying_party.rp_id = TEST_RP_ID.to_string();
                settings.relying_party.rp_origin = TEST_ORIGIN.to_string();
                settings.relying_party.rp_name = "Test Relying Party".to_string();
                settings
            })
            .clone()
    }

    /// Coordinator over an in-memory store and the native verifier
    #[must_use]
    pub fn coordinator() -> CeremonyCoordinator {
        Self::coordinator_with(
            Self::settings(),
            Arc::new(InMemoryStore::new()),
            Arc::new(WebAuthnVerifier::new()),
        )
    }

    #[must_use]
    pub fn coordinator_with(
        settings: Settings,
        store: Arc<dyn CredentialStore>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> CeremonyCoordinator {
        CeremonyCoordinator::new(settings, store, verifier)
    }

    /// Run a full registration ceremony and return the stored credential id
    ///
    /// # Panics
    ///
    /// Panics if either ceremony step fails or the response is not verified.
    pub async fn register(
        coordinator: &CeremonyCoordinator,
        login: &str,
        authenticator: &SoftAuthenticator,
    ) -> CredentialId {
        let options = coordinator
            .begin_registration(login)
            .await
            .expect("begin_registration failed");
        let response = authenticator.attest(&options.challenge);
        coordinator
            .finish_registration(login, &response)
            .await
            .expect("finish_registration failed")
            .into_result()
            .expect("registration was not verified")
    }

    /// Advance the authenticator's counter and run a full authentication ceremony
    ///
    /// # Panics
    ///
    /// Panics if either ceremony step returns an error.
    pub async fn authenticate(
        coordinator: &CeremonyCoordinator,
        login: &str,
        authenticator: &mut SoftAuthenticator,
    ) -> CeremonyOutcome {
        authenticator.set_counter(authenticator.counter() + 1);
        let options = coordinator
            .begin_authentication(login)
            .await
            .expect("begin_authentication failed");
        let response = authenticator.assert(&options.challenge);
        coordinator
            .finish_authentication(login, &response)
            .await
            .expect("finish_authentication failed")
    }
}
