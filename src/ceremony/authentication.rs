use super::{normalize_login, CeremonyCoordinator, CeremonyOutcome};
use crate::error::{CeremonyError, VerificationError};
use crate::models::{CeremonyKind, CredentialId};
use crate::utils::logging::LoggingHelper;
use crate::verifier::{
    counter_is_valid, AuthenticationChallengeParams, AuthenticationExpectations, Verdict,
};
use crate::webauthn::{AuthenticationOptions, AuthenticationResponse, PublicKeyCredentialDescriptor};

impl CeremonyCoordinator {
    /// Start authenticating `login` with one of their registered credentials
    ///
    /// # Errors
    /// - `InvalidInput` for a malformed login
    /// - `UserNotRegistered` if the login is unknown or has no credentials
    /// - `StoreUnavailable` if the store fails
    pub async fn begin_authentication(
        &self,
        login: &str,
    ) -> Result<AuthenticationOptions, CeremonyError> {
        let login = normalize_login(login)?;
        let _guard = self.locks.lock(&login).await;

        let user = match self.store.get_user(&login).await? {
            Some(user) if !user.credentials.is_empty() => user,
            _ => return Err(CeremonyError::UserNotRegistered(login)),
        };

        let params = AuthenticationChallengeParams {
            rp_id: self.settings.relying_party.rp_id.clone(),
            allow_credentials: user
                .credentials
                .iter()
                .map(|c| {
                    PublicKeyCredentialDescriptor::new(
                        c.id.clone(),
                        c.transports.iter().copied().collect(),
                    )
                })
                .collect(),
            user_verification: self.settings.ceremony.user_verification,
            timeout_ms: self.settings.ceremony.timeout_millis(),
        };

        let options = self
            .verifier
            .make_authentication_challenge(params)
            .map_err(|e| CeremonyError::VerificationFailed(e.to_string()))?;

        self.store_challenge(&login, options.challenge.clone(), CeremonyKind::Authentication)
            .await?;
        Ok(options)
    }

    /// Complete authentication with the client's assertion response
    ///
    /// The pending challenge is consumed whatever the outcome. On success the
    /// credential's signature counter and last-used time are updated; the
    /// counter is re-checked against the stored value under the user lock so
    /// concurrent assertions cannot both advance it.
    ///
    /// # Errors
    /// - `InvalidInput` for a malformed login or a `rawId` that is not base64url
    /// - `UserNotFound` for an unknown login
    /// - `NoPendingChallenge` if no live authentication challenge exists
    /// - `AuthenticatorNotRegistered` if the credential is not the user's
    /// - `StoreUnavailable` if the store fails
    pub async fn finish_authentication(
        &self,
        login: &str,
        response: &AuthenticationResponse,
    ) -> Result<CeremonyOutcome, CeremonyError> {
        let login = normalize_login(login)?;
        let (user, pending) = self
            .take_challenge(&login, CeremonyKind::Authentication)
            .await?;

        let credential_id = response
            .credential_id()
            .map_err(|e| CeremonyError::InvalidInput(format!("rawId is not base64url: {e}")))?;
        let Some(credential) = user.find_credential(&credential_id).cloned() else {
            log::warn!("Assertion for {login} used unregistered credential {credential_id}");
            return Err(CeremonyError::AuthenticatorNotRegistered);
        };

        let rp = &self.settings.relying_party;
        let expected = AuthenticationExpectations {
            challenge: pending.challenge,
            origin: rp.rp_origin.clone(),
            rp_id: rp.rp_id.clone(),
            require_user_verification: self.settings.ceremony.require_user_verification(),
            user_handle: user.user_handle.clone(),
            credential,
        };

        let assertion = match self
            .verifier
            .check_authentication_response(response, &expected)
            .await
        {
            Ok(Verdict::Verified(assertion)) => assertion,
            Ok(Verdict::Rejected(reason)) => {
                LoggingHelper::log_ceremony_rejected(&login, CeremonyKind::Authentication, &reason);
                return Ok(CeremonyOutcome::rejected(Some(credential_id), reason));
            }
            Err(e) => {
                let reason = e.to_string();
                LoggingHelper::log_ceremony_rejected(&login, CeremonyKind::Authentication, &reason);
                return Ok(CeremonyOutcome::rejected(Some(credential_id), reason));
            }
        };

        self.commit_counter(&login, credential_id, assertion.new_counter)
            .await
    }

    /// Store the asserted counter if it still advances the current stored value
    async fn commit_counter(
        &self,
        login: &str,
        credential_id: CredentialId,
        new_counter: u32,
    ) -> Result<CeremonyOutcome, CeremonyError> {
        let _guard = self.locks.lock(login).await;

        let current = self
            .store
            .get_user(login)
            .await?
            .and_then(|user| user.find_credential(&credential_id).map(|c| c.counter));
        let Some(stored) = current else {
            return Err(CeremonyError::AuthenticatorNotRegistered);
        };

        if !counter_is_valid(stored, new_counter) {
            LoggingHelper::log_counter_regression(login, &credential_id, stored, new_counter);
            return Ok(CeremonyOutcome::rejected(
                Some(credential_id),
                VerificationError::CounterRegression {
                    stored,
                    received: new_counter,
                }
                .to_string(),
            ));
        }

        self.store
            .update_credential_counter(&credential_id, new_counter)
            .await?;
        LoggingHelper::log_authenticated(login, &credential_id, new_counter);
        Ok(CeremonyOutcome::verified(credential_id))
    }
}
