use std::sync::Arc;
use std::time::Duration;

use passkey_rp::testing::{SoftAuthenticator, TestFixtures, OTHER_LOGIN, TEST_LOGIN};
use passkey_rp::webauthn::UserVerificationPolicy;
use passkey_rp::{
    AuthenticatorTransport, CeremonyCoordinator, CeremonyError, CeremonyKind, InMemoryStore,
    WebAuthnVerifier,
};

fn coordinator_with_timeout(seconds: u64) -> CeremonyCoordinator {
    let mut settings = TestFixtures::settings();
    settings.ceremony.challenge_timeout_seconds = seconds;
    TestFixtures::coordinator_with(
        settings,
        Arc::new(InMemoryStore::new()),
        Arc::new(WebAuthnVerifier::new()),
    )
}

/// Register a passkey, then sign in with it twice
#[tokio::test]
async fn test_register_then_authenticate() {
    let coordinator = TestFixtures::coordinator();
    let mut authenticator = SoftAuthenticator::new();

    let credential_id = TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;
    assert_eq!(&credential_id, authenticator.credential_id());

    let user = coordinator
        .store()
        .get_user(TEST_LOGIN)
        .await
        .unwrap()
        .expect("user should be provisioned");
    assert_eq!(user.credentials.len(), 1);
    assert!(user.pending_challenge.is_none());
    let stored = &user.credentials[0];
    assert_eq!(stored.counter, 0);
    assert!(stored.transports.contains(&AuthenticatorTransport::Usb));
    assert!(stored.transports.contains(&AuthenticatorTransport::Hybrid));

    let outcome = TestFixtures::authenticate(&coordinator, TEST_LOGIN, &mut authenticator).await;
    assert!(outcome.verified, "first sign-in rejected: {:?}", outcome.reason);
    assert_eq!(outcome.credential_id.as_ref(), Some(&credential_id));

    let outcome = TestFixtures::authenticate(&coordinator, TEST_LOGIN, &mut authenticator).await;
    assert!(outcome.verified);

    let user = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    assert_eq!(user.credentials[0].counter, 2);
    assert!(user.credentials[0].last_used_at.is_some());
}

#[tokio::test]
async fn test_registration_options_describe_user_and_relying_party() {
    let coordinator = TestFixtures::coordinator();

    let options = coordinator.begin_registration(TEST_LOGIN).await.unwrap();
    assert_eq!(options.rp.id, "localhost");
    assert_eq!(options.user.name, "alice@localhost");
    assert_eq!(options.user.display_name, "alice");
    assert_eq!(options.timeout, 60_000);
    assert_eq!(options.attestation, "none");
    assert!(options.exclude_credentials.is_empty());

    let algorithms: Vec<i64> = options.pub_key_cred_params.iter().map(|p| p.alg).collect();
    assert_eq!(algorithms, vec![-7, -257]);

    let user = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    assert_eq!(options.user.id, user.user_handle);
    let pending = user.pending_challenge.expect("challenge should be pending");
    assert_eq!(pending.kind, CeremonyKind::Registration);
    assert_eq!(pending.challenge, options.challenge);
}

#[tokio::test]
async fn test_second_registration_excludes_existing_credentials() {
    let coordinator = TestFixtures::coordinator();
    let first = SoftAuthenticator::new();
    let credential_id = TestFixtures::register(&coordinator, TEST_LOGIN, &first).await;

    let options = coordinator.begin_registration(TEST_LOGIN).await.unwrap();
    assert_eq!(options.exclude_credentials.len(), 1);
    assert_eq!(options.exclude_credentials[0].id, credential_id);

    let second = SoftAuthenticator::new();
    let outcome = coordinator
        .finish_registration(TEST_LOGIN, &second.attest(&options.challenge))
        .await
        .unwrap();
    assert!(outcome.verified);

    let user = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    assert_eq!(user.credentials.len(), 2);

    let options = coordinator.begin_authentication(TEST_LOGIN).await.unwrap();
    assert_eq!(options.allow_credentials.len(), 2);
}

#[tokio::test]
async fn test_reregistering_same_credential_is_a_no_op() {
    let coordinator = TestFixtures::coordinator();
    let authenticator = SoftAuthenticator::new();

    let first = TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;
    let second = TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;
    assert_eq!(first, second);

    let user = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    assert_eq!(user.credentials.len(), 1);
}

#[tokio::test]
async fn test_credential_owned_by_another_user_is_rejected() {
    let coordinator = TestFixtures::coordinator();
    let authenticator = SoftAuthenticator::new();
    TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;

    let options = coordinator.begin_registration(OTHER_LOGIN).await.unwrap();
    let outcome = coordinator
        .finish_registration(OTHER_LOGIN, &authenticator.attest(&options.challenge))
        .await
        .unwrap();
    assert!(!outcome.verified);

    let bob = coordinator.store().get_user(OTHER_LOGIN).await.unwrap().unwrap();
    assert!(bob.credentials.is_empty());
    let alice = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    assert_eq!(alice.credentials.len(), 1);
}

#[tokio::test]
async fn test_finishing_registration_twice_fails() {
    let coordinator = TestFixtures::coordinator();
    let authenticator = SoftAuthenticator::new();

    let options = coordinator.begin_registration(TEST_LOGIN).await.unwrap();
    let response = authenticator.attest(&options.challenge);
    let outcome = coordinator
        .finish_registration(TEST_LOGIN, &response)
        .await
        .unwrap();
    assert!(outcome.verified);

    let err = coordinator
        .finish_registration(TEST_LOGIN, &response)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CeremonyError::NoPendingChallenge(CeremonyKind::Registration)
    ));
}

#[tokio::test]
async fn test_replayed_assertion_is_refused() {
    let coordinator = TestFixtures::coordinator();
    let mut authenticator = SoftAuthenticator::new();
    TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;

    authenticator.set_counter(1);
    let options = coordinator.begin_authentication(TEST_LOGIN).await.unwrap();
    let response = authenticator.assert(&options.challenge);
    assert!(
        coordinator
            .finish_authentication(TEST_LOGIN, &response)
            .await
            .unwrap()
            .verified
    );

    let err = coordinator
        .finish_authentication(TEST_LOGIN, &response)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CeremonyError::NoPendingChallenge(CeremonyKind::Authentication)
    ));
}

#[tokio::test]
async fn test_begin_replaces_unconsumed_challenge() {
    let coordinator = TestFixtures::coordinator();
    let authenticator = SoftAuthenticator::new();

    let stale = coordinator.begin_registration(TEST_LOGIN).await.unwrap();
    let _fresh = coordinator.begin_registration(TEST_LOGIN).await.unwrap();

    let outcome = coordinator
        .finish_registration(TEST_LOGIN, &authenticator.attest(&stale.challenge))
        .await
        .unwrap();
    assert!(!outcome.verified);
    assert!(outcome.reason.is_some());
}

#[tokio::test]
async fn test_authentication_requires_registered_credentials() {
    let coordinator = TestFixtures::coordinator();

    let err = coordinator.begin_authentication("nobody").await.unwrap_err();
    assert!(matches!(err, CeremonyError::UserNotRegistered(ref login) if login == "nobody"));

    // Provisioned by an abandoned registration, but holds no credentials
    coordinator.begin_registration(TEST_LOGIN).await.unwrap();
    let err = coordinator.begin_authentication(TEST_LOGIN).await.unwrap_err();
    assert!(matches!(err, CeremonyError::UserNotRegistered(_)));
}

#[tokio::test]
async fn test_auto_provisioning_can_be_disabled() {
    let mut settings = TestFixtures::settings();
    settings.ceremony.auto_provision_users = false;
    let coordinator = TestFixtures::coordinator_with(
        settings,
        Arc::new(InMemoryStore::new()),
        Arc::new(WebAuthnVerifier::new()),
    );

    let err = coordinator.begin_registration("carol").await.unwrap_err();
    assert!(matches!(err, CeremonyError::UserNotFound(ref login) if login == "carol"));

    coordinator.store().get_or_create_user("carol").await.unwrap();
    assert!(coordinator.begin_registration("carol").await.is_ok());
}

#[tokio::test]
async fn test_logins_are_normalized() {
    let coordinator = TestFixtures::coordinator();
    let authenticator = SoftAuthenticator::new();

    let options = coordinator.begin_registration("  alice ").await.unwrap();
    let outcome = coordinator
        .finish_registration(TEST_LOGIN, &authenticator.attest(&options.challenge))
        .await
        .unwrap();
    assert!(outcome.verified);

    for bad in ["", "   ", "ali\tce"] {
        let err = coordinator.begin_registration(bad).await.unwrap_err();
        assert!(matches!(err, CeremonyError::InvalidInput(_)), "{bad:?}");
    }
}

#[tokio::test]
async fn test_finish_for_unknown_user() {
    let coordinator = TestFixtures::coordinator();
    let authenticator = SoftAuthenticator::new();
    let options = coordinator.begin_registration(TEST_LOGIN).await.unwrap();

    let err = coordinator
        .finish_registration(OTHER_LOGIN, &authenticator.attest(&options.challenge))
        .await
        .unwrap_err();
    assert!(matches!(err, CeremonyError::UserNotFound(_)));
}

#[tokio::test]
async fn test_expired_challenge_is_refused_and_consumed() {
    let coordinator = coordinator_with_timeout(0);
    let authenticator = SoftAuthenticator::new();

    let options = coordinator.begin_registration(TEST_LOGIN).await.unwrap();
    let err = coordinator
        .finish_registration(TEST_LOGIN, &authenticator.attest(&options.challenge))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CeremonyError::NoPendingChallenge(CeremonyKind::Registration)
    ));

    let user = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    assert!(user.pending_challenge.is_none());
    assert!(user.credentials.is_empty());
}

#[tokio::test]
async fn test_challenge_kind_must_match() {
    let coordinator = TestFixtures::coordinator();
    let mut authenticator = SoftAuthenticator::new();
    TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;

    let options = coordinator.begin_registration(TEST_LOGIN).await.unwrap();
    authenticator.set_counter(1);
    let err = coordinator
        .finish_authentication(TEST_LOGIN, &authenticator.assert(&options.challenge))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CeremonyError::NoPendingChallenge(CeremonyKind::Authentication)
    ));

    // The mismatched challenge was consumed too
    let err = coordinator
        .finish_registration(TEST_LOGIN, &authenticator.attest(&options.challenge))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CeremonyError::NoPendingChallenge(CeremonyKind::Registration)
    ));
}

#[tokio::test]
async fn test_counter_must_advance() {
    let coordinator = TestFixtures::coordinator();
    let mut authenticator = SoftAuthenticator::new();
    TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;
    assert!(
        TestFixtures::authenticate(&coordinator, TEST_LOGIN, &mut authenticator)
            .await
            .verified
    );

    // Same counter again: a cloned authenticator would look like this
    let options = coordinator.begin_authentication(TEST_LOGIN).await.unwrap();
    let outcome = coordinator
        .finish_authentication(TEST_LOGIN, &authenticator.assert(&options.challenge))
        .await
        .unwrap();
    assert!(!outcome.verified);
    assert!(outcome
        .reason
        .as_deref()
        .is_some_and(|r| r.contains("did not advance")));

    let user = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    assert_eq!(user.credentials[0].counter, 1);
}

#[tokio::test]
async fn test_zero_counter_authenticators_keep_working() {
    let coordinator = TestFixtures::coordinator();
    let authenticator = SoftAuthenticator::new();
    TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;

    for _ in 0..3 {
        let options = coordinator.begin_authentication(TEST_LOGIN).await.unwrap();
        let outcome = coordinator
            .finish_authentication(TEST_LOGIN, &authenticator.assert(&options.challenge))
            .await
            .unwrap();
        assert!(outcome.verified, "{:?}", outcome.reason);
    }
}

#[tokio::test]
async fn test_unregistered_authenticator_is_refused() {
    let coordinator = TestFixtures::coordinator();
    let authenticator = SoftAuthenticator::new();
    TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;

    let mut stranger = SoftAuthenticator::new();
    stranger.set_counter(5);
    let options = coordinator.begin_authentication(TEST_LOGIN).await.unwrap();
    let err = coordinator
        .finish_authentication(TEST_LOGIN, &stranger.assert(&options.challenge))
        .await
        .unwrap_err();
    assert!(matches!(err, CeremonyError::AuthenticatorNotRegistered));
}

#[tokio::test]
async fn test_credential_of_another_user_is_refused() {
    let coordinator = TestFixtures::coordinator();
    let alice_key = SoftAuthenticator::new();
    let mut bob_key = SoftAuthenticator::new();
    TestFixtures::register(&coordinator, TEST_LOGIN, &alice_key).await;
    TestFixtures::register(&coordinator, OTHER_LOGIN, &bob_key).await;

    bob_key.set_counter(1);
    let options = coordinator.begin_authentication(TEST_LOGIN).await.unwrap();
    let err = coordinator
        .finish_authentication(TEST_LOGIN, &bob_key.assert(&options.challenge))
        .await
        .unwrap_err();
    assert!(matches!(err, CeremonyError::AuthenticatorNotRegistered));

    let bob = coordinator.store().get_user(OTHER_LOGIN).await.unwrap().unwrap();
    assert_eq!(bob.credentials[0].counter, 0);
}

#[tokio::test]
async fn test_user_handle_must_match_account() {
    let coordinator = TestFixtures::coordinator();
    let mut authenticator = SoftAuthenticator::new();
    TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;
    coordinator.begin_registration(OTHER_LOGIN).await.unwrap();

    let alice = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    let bob = coordinator.store().get_user(OTHER_LOGIN).await.unwrap().unwrap();

    authenticator.set_counter(1);
    let options = coordinator.begin_authentication(TEST_LOGIN).await.unwrap();
    let mut response = authenticator.assert(&options.challenge);
    response.response.user_handle = Some(bob.user_handle.to_base64url());
    let outcome = coordinator
        .finish_authentication(TEST_LOGIN, &response)
        .await
        .unwrap();
    assert!(!outcome.verified);

    let options = coordinator.begin_authentication(TEST_LOGIN).await.unwrap();
    let mut response = authenticator.assert(&options.challenge);
    response.response.user_handle = Some(alice.user_handle.to_base64url());
    let outcome = coordinator
        .finish_authentication(TEST_LOGIN, &response)
        .await
        .unwrap();
    assert!(outcome.verified, "{:?}", outcome.reason);
}

#[tokio::test]
async fn test_malformed_raw_id_is_invalid_input() {
    let coordinator = TestFixtures::coordinator();
    let mut authenticator = SoftAuthenticator::new();
    TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;

    authenticator.set_counter(1);
    let options = coordinator.begin_authentication(TEST_LOGIN).await.unwrap();
    let mut response = authenticator.assert(&options.challenge);
    response.raw_id = "not*base64url!".to_string();

    let err = coordinator
        .finish_authentication(TEST_LOGIN, &response)
        .await
        .unwrap_err();
    assert!(matches!(err, CeremonyError::InvalidInput(_)));
}

#[tokio::test]
async fn test_wrong_origin_is_rejected() {
    let coordinator = TestFixtures::coordinator();
    let phishing = SoftAuthenticator::new().with_origin("https://login.example.net");

    let options = coordinator.begin_registration(TEST_LOGIN).await.unwrap();
    let outcome = coordinator
        .finish_registration(TEST_LOGIN, &phishing.attest(&options.challenge))
        .await
        .unwrap();
    assert!(!outcome.verified);
    assert!(outcome.credential_id.is_none());

    let user = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    assert!(user.credentials.is_empty());
}

#[tokio::test]
async fn test_required_user_verification() {
    let mut settings = TestFixtures::settings();
    settings.ceremony.user_verification = UserVerificationPolicy::Required;
    let coordinator = TestFixtures::coordinator_with(
        settings,
        Arc::new(InMemoryStore::new()),
        Arc::new(WebAuthnVerifier::new()),
    );

    let presence_only = SoftAuthenticator::new().with_user_verification(false);
    let options = coordinator.begin_registration(TEST_LOGIN).await.unwrap();
    let outcome = coordinator
        .finish_registration(TEST_LOGIN, &presence_only.attest(&options.challenge))
        .await
        .unwrap();
    assert!(!outcome.verified);

    let verifying = SoftAuthenticator::new();
    TestFixtures::register(&coordinator, TEST_LOGIN, &verifying).await;
}

/// Settings are not validated by the coordinator; an oversized timeout must
/// still issue a challenge instead of overflowing the expiry time
#[tokio::test]
async fn test_oversized_timeout_does_not_overflow() {
    let coordinator = coordinator_with_timeout(10_000_000_000_000);
    let authenticator = SoftAuthenticator::new();

    let options = coordinator.begin_registration(TEST_LOGIN).await.unwrap();
    let outcome = coordinator
        .finish_registration(TEST_LOGIN, &authenticator.attest(&options.challenge))
        .await
        .unwrap();
    assert!(outcome.verified);
}

#[tokio::test]
async fn test_sweep_removes_expired_challenges() {
    let coordinator = coordinator_with_timeout(0);
    coordinator.begin_registration(TEST_LOGIN).await.unwrap();
    coordinator.begin_registration(OTHER_LOGIN).await.unwrap();

    assert_eq!(coordinator.sweep_expired_challenges().await.unwrap(), 2);
    assert_eq!(coordinator.sweep_expired_challenges().await.unwrap(), 0);

    let user = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    assert!(user.pending_challenge.is_none());
}

#[tokio::test]
async fn test_sweep_keeps_live_challenges() {
    let coordinator = TestFixtures::coordinator();
    coordinator.begin_registration(TEST_LOGIN).await.unwrap();

    assert_eq!(coordinator.sweep_expired_challenges().await.unwrap(), 0);
    let user = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    assert!(user.pending_challenge.is_some());
}

#[tokio::test]
async fn test_background_sweeper() {
    let coordinator = Arc::new(coordinator_with_timeout(0));
    coordinator.begin_registration(TEST_LOGIN).await.unwrap();

    let sweeper = coordinator.spawn_challenge_sweeper(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(100)).await;
    sweeper.abort();

    let user = coordinator.store().get_user(TEST_LOGIN).await.unwrap().unwrap();
    assert!(user.pending_challenge.is_none());
}
