use super::{normalize_login, CeremonyCoordinator, CeremonyOutcome};
use crate::error::{CeremonyError, StoreError};
use crate::models::{CeremonyKind, Credential};
use crate::utils::logging::LoggingHelper;
use crate::verifier::{RegistrationChallengeParams, RegistrationExpectations, Verdict};
use crate::webauthn::{PublicKeyCredentialDescriptor, RegistrationOptions, RegistrationResponse};

impl CeremonyCoordinator {
    /// Start registering a new authenticator for `login`
    ///
    /// Unknown logins are provisioned when `auto_provision_users` is on. The
    /// returned options carry a fresh challenge that is stored as the user's
    /// pending registration challenge, replacing any unconsumed one.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty login or one with control characters
    /// - `UserNotFound` for an unknown login when auto-provisioning is off
    /// - `StoreUnavailable` if the store fails
    pub async fn begin_registration(&self, login: &str) -> Result<RegistrationOptions, CeremonyError> {
        let login = normalize_login(login)?;
        let _guard = self.locks.lock(&login).await;

        let user = if self.settings.ceremony.auto_provision_users {
            self.store.get_or_create_user(&login).await?
        } else {
            self.store
                .get_user(&login)
                .await?
                .ok_or_else(|| CeremonyError::UserNotFound(login.clone()))?
        };

        let rp = &self.settings.relying_party;
        let ceremony = &self.settings.ceremony;
        let params = RegistrationChallengeParams {
            rp_id: rp.rp_id.clone(),
            rp_name: rp.rp_name.clone(),
            user_handle: user.user_handle.clone(),
            user_name: user.user_name(&rp.rp_id),
            display_name: user.display_name.clone(),
            exclude_credentials: user
                .credentials
                .iter()
                .map(|c| {
                    PublicKeyCredentialDescriptor::new(
                        c.id.clone(),
                        c.transports.iter().copied().collect(),
                    )
                })
                .collect(),
            resident_key: ceremony.resident_key,
            user_verification: ceremony.user_verification,
            algorithms: ceremony.algorithms.clone(),
            timeout_ms: ceremony.timeout_millis(),
        };

        let options = self
            .verifier
            .make_registration_challenge(params)
            .map_err(|e| CeremonyError::VerificationFailed(e.to_string()))?;

        self.store_challenge(&login, options.challenge.clone(), CeremonyKind::Registration)
            .await?;
        Ok(options)
    }

    /// Complete registration with the client's attestation response
    ///
    /// The pending challenge is consumed whatever the outcome. A verified
    /// credential is appended to the user; re-registering a credential the
    /// user already holds is a verified no-op.
    ///
    /// # Errors
    /// - `InvalidInput` for a malformed login
    /// - `UserNotFound` for an unknown login
    /// - `NoPendingChallenge` if no live registration challenge exists
    /// - `StoreUnavailable` if the store fails
    pub async fn finish_registration(
        &self,
        login: &str,
        response: &RegistrationResponse,
    ) -> Result<CeremonyOutcome, CeremonyError> {
        let login = normalize_login(login)?;
        let (_, pending) = self.take_challenge(&login, CeremonyKind::Registration).await?;

        let rp = &self.settings.relying_party;
        let expected = RegistrationExpectations {
            challenge: pending.challenge,
            origin: rp.rp_origin.clone(),
            rp_id: rp.rp_id.clone(),
            require_user_verification: self.settings.ceremony.require_user_verification(),
            algorithms: self.settings.ceremony.algorithms.clone(),
        };

        let verified = match self
            .verifier
            .check_registration_response(response, &expected)
            .await
        {
            Ok(Verdict::Verified(verified)) => verified,
            Ok(Verdict::Rejected(reason)) => {
                LoggingHelper::log_ceremony_rejected(&login, CeremonyKind::Registration, &reason);
                return Ok(CeremonyOutcome::rejected(None, reason));
            }
            Err(e) => {
                let reason = e.to_string();
                LoggingHelper::log_ceremony_rejected(&login, CeremonyKind::Registration, &reason);
                return Ok(CeremonyOutcome::rejected(None, reason));
            }
        };

        let credential_id = verified.id.clone();
        let credential = Credential::new(
            verified.id,
            verified.public_key,
            verified.counter,
            verified.transports.into_iter().collect(),
        );

        let _guard = self.locks.lock(&login).await;
        match self.store.append_credential(&login, credential).await {
            Ok(true) => {
                LoggingHelper::log_credential_registered(&login, &credential_id);
                Ok(CeremonyOutcome::verified(credential_id))
            }
            Ok(false) => {
                log::info!("Credential {credential_id} already registered for {login}");
                Ok(CeremonyOutcome::verified(credential_id))
            }
            Err(StoreError::DuplicateCredential(_)) => {
                let reason = "credential is registered to another account";
                LoggingHelper::log_ceremony_rejected(&login, CeremonyKind::Registration, reason);
                Ok(CeremonyOutcome::rejected(Some(credential_id), reason))
            }
            Err(e) => Err(e.into()),
        }
    }
}
