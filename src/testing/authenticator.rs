//! Software authenticator
//!
//! Holds a P-256 key and produces attestation and assertion responses the way
//! a browser would hand them to the relying party.

use ciborium::value::Value;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

use super::constants::{TEST_ORIGIN, TEST_RP_ID};
use crate::models::{Challenge, CredentialId};
use crate::utils::encoding;
use crate::webauthn::authenticator_data::{
    FLAG_ATTESTED_CREDENTIAL_DATA, FLAG_USER_PRESENT, FLAG_USER_VERIFIED,
};
use crate::webauthn::client_data::{TYPE_CREATE, TYPE_GET};
use crate::webauthn::crypto::{sha256, signed_message};
use crate::webauthn::{
    cose_alg, AuthenticationResponse, AuthenticatorAssertionResponse,
    AuthenticatorAttestationResponse, RegistrationResponse, PUBLIC_KEY_TYPE,
};

/// ES256 authenticator with a settable signature counter
pub struct SoftAuthenticator {
    rng: SystemRandom,
    key_pair: EcdsaKeyPair,
    credential_id: CredentialId,
    counter: u32,
    user_verification: bool,
    origin: String,
    rp_id: String,
    transports: Vec<String>,
}

impl Default for SoftAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftAuthenticator {
    /// Create an authenticator with a random 16-byte credential id
    ///
    /// # Panics
    ///
    /// Panics if the system RNG fails.
    #[must_use]
    pub fn new() -> Self {
        let mut id = vec![0u8; 16];
        SystemRandom::new()
            .fill(&mut id)
            .expect("system RNG failed");
        Self::with_credential_id(id)
    }

    /// Create an authenticator with a fresh key under a chosen credential id
    ///
    /// # Panics
    ///
    /// Panics if key generation fails.
    #[must_use]
    pub fn with_credential_id(credential_id: Vec<u8>) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("P-256 key generation failed");
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
            .expect("generated key must parse");

        Self {
            rng,
            key_pair,
            credential_id: CredentialId::new(credential_id),
            counter: 0,
            user_verification: true,
            origin: TEST_ORIGIN.to_string(),
            rp_id: TEST_RP_ID.to_string(),
            transports: vec!["usb".to_string(), "hybrid".to_string()],
        }
    }

    /// Whether responses carry the UV flag
    #[must_use]
    pub fn with_user_verification(mut self, verified: bool) -> Self {
        self.user_verification = verified;
        self
    }

    /// Origin written into client data
    #[must_use]
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = origin.to_string();
        self
    }

    /// RP id hashed into authenticator data
    #[must_use]
    pub fn with_rp_id(mut self, rp_id: &str) -> Self {
        self.rp_id = rp_id.to_string();
        self
    }

    #[must_use]
    pub fn credential_id(&self) -> &CredentialId {
        &self.credential_id
    }

    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn set_counter(&mut self, counter: u32) {
        self.counter = counter;
    }

    /// COSE encoding of the public key
    ///
    /// # Panics
    ///
    /// Panics if CBOR encoding fails.
    #[must_use]
    pub fn cose_public_key(&self) -> Vec<u8> {
        let point = self.key_pair.public_key().as_ref();
        let key = Value::Map(vec![
            (int(1), int(2)),
            (int(3), int(cose_alg::ES256)),
            (int(-1), int(1)),
            (int(-2), Value::Bytes(point[1..33].to_vec())),
            (int(-3), Value::Bytes(point[33..65].to_vec())),
        ]);
        cbor(&key)
    }

    /// Registration response with `none` attestation
    #[must_use]
    pub fn attest(&self, challenge: &Challenge) -> RegistrationResponse {
        let client_data_json = self.client_data_json(TYPE_CREATE, challenge);
        let auth_data = self.authenticator_data(true);
        self.registration_response("none", Vec::new(), &auth_data, &client_data_json)
    }

    /// Registration response with `packed` self-attestation
    #[must_use]
    pub fn attest_packed_self(&self, challenge: &Challenge) -> RegistrationResponse {
        let client_data_json = self.client_data_json(TYPE_CREATE, challenge);
        let auth_data = self.authenticator_data(true);
        let sig = self.sign(&signed_message(&auth_data, &client_data_json));
        let statement = vec![
            (Value::Text("alg".to_string()), int(cose_alg::ES256)),
            (Value::Text("sig".to_string()), Value::Bytes(sig)),
        ];
        self.registration_response("packed", statement, &auth_data, &client_data_json)
    }

    /// Assertion response signed at the current counter value
    #[must_use]
    pub fn assert(&self, challenge: &Challenge) -> AuthenticationResponse {
        let client_data_json = self.client_data_json(TYPE_GET, challenge);
        let auth_data = self.authenticator_data(false);
        let signature = self.sign(&signed_message(&auth_data, &client_data_json));
        let id = self.credential_id.to_base64url();

        AuthenticationResponse {
            id: id.clone(),
            raw_id: id,
            response: AuthenticatorAssertionResponse {
                client_data_json: encoding::encode(&client_data_json),
                authenticator_data: encoding::encode(&auth_data),
                signature: encoding::encode(&signature),
                user_handle: None,
            },
            authenticator_attachment: Some("cross-platform".to_string()),
            client_extension_results: Some(serde_json::json!({})),
            r#type: PUBLIC_KEY_TYPE.to_string(),
        }
    }

    fn registration_response(
        &self,
        fmt: &str,
        statement: Vec<(Value, Value)>,
        auth_data: &[u8],
        client_data_json: &[u8],
    ) -> RegistrationResponse {
        let attestation_object = cbor(&Value::Map(vec![
            (Value::Text("fmt".to_string()), Value::Text(fmt.to_string())),
            (Value::Text("attStmt".to_string()), Value::Map(statement)),
            (Value::Text("authData".to_string()), Value::Bytes(auth_data.to_vec())),
        ]));
        let id = self.credential_id.to_base64url();

        RegistrationResponse {
            id: id.clone(),
            raw_id: id,
            response: AuthenticatorAttestationResponse {
                client_data_json: encoding::encode(client_data_json),
                attestation_object: encoding::encode(&attestation_object),
                transports: self.transports.clone(),
            },
            authenticator_attachment: Some("cross-platform".to_string()),
            client_extension_results: Some(serde_json::json!({})),
            r#type: PUBLIC_KEY_TYPE.to_string(),
        }
    }

    fn client_data_json(&self, ty: &str, challenge: &Challenge) -> Vec<u8> {
        serde_json::json!({
            "type": ty,
            "challenge": challenge.to_base64url(),
            "origin": self.origin,
            "crossOrigin": false,
        })
        .to_string()
        .into_bytes()
    }

    fn authenticator_data(&self, attested: bool) -> Vec<u8> {
        let mut flags = FLAG_USER_PRESENT;
        if self.user_verification {
            flags |= FLAG_USER_VERIFIED;
        }
        if attested {
            flags |= FLAG_ATTESTED_CREDENTIAL_DATA;
        }

        let mut data = sha256(self.rp_id.as_bytes());
        data.push(flags);
        data.extend_from_slice(&self.counter.to_be_bytes());

        if attested {
            let id = self.credential_id.as_bytes();
            let id_len = u16::try_from(id.len()).expect("credential id fits in u16");
            data.extend_from_slice(&[0u8; 16]); // AAGUID
            data.extend_from_slice(&id_len.to_be_bytes());
            data.extend_from_slice(id);
            data.extend_from_slice(&self.cose_public_key());
        }
        data
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key_pair
            .sign(&self.rng, message)
            .expect("ECDSA signing failed")
            .as_ref()
            .to_vec()
    }
}

fn int(value: i64) -> Value {
    Value::Integer(value.into())
}

fn cbor(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).expect("CBOR encoding into a Vec cannot fail");
    out
}
