//! `WebAuthn` cryptography operations
//!
//! Challenge generation, digests and signature verification on top of `ring`.

use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};

use super::cbor::CoseKey;
use crate::error::VerificationError;
use crate::models::Challenge;

pub const CHALLENGE_LEN: usize = 32;

/// Generate a random 32-byte challenge
///
/// # Errors
/// Returns `VerificationError::ChallengeGeneration` if the system RNG fails
pub fn generate_challenge(rng: &SystemRandom) -> Result<Challenge, VerificationError> {
    let mut bytes = vec![0u8; CHALLENGE_LEN];
    rng.fill(&mut bytes)
        .map_err(|_| VerificationError::ChallengeGeneration)?;
    Ok(Challenge::new(bytes))
}

/// Hash data using SHA-256
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

/// Build the byte string every WebAuthn signature covers:
/// `authenticatorData || SHA-256(clientDataJSON)`
#[must_use]
pub fn signed_message(authenticator_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let mut message = authenticator_data.to_vec();
    message.extend_from_slice(&sha256(client_data_json));
    message
}

/// Verify a signature with a COSE public key
///
/// ES256 signatures are ASN.1 DER, RS256 is PKCS#1 v1.5 with a 2048-bit
/// minimum modulus, `EdDSA` is Ed25519.
///
/// # Errors
/// Returns `VerificationError::BadSignature` if the signature does not verify
pub fn verify_signature(
    key: &CoseKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), VerificationError> {
    let result = match key {
        CoseKey::Ec2 { x, y, .. } => {
            let mut point = Vec::with_capacity(65);
            point.push(0x04);
            point.extend_from_slice(x);
            point.extend_from_slice(y);
            UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, point)
                .verify(message, signature)
        }
        CoseKey::Rsa { n, e, .. } => RsaPublicKeyComponents {
            n: strip_leading_zeros(n),
            e: strip_leading_zeros(e),
        }
        .verify(&signature::RSA_PKCS1_2048_8192_SHA256, message, signature),
        CoseKey::Okp { x, .. } => {
            UnparsedPublicKey::new(&signature::ED25519, x).verify(message, signature)
        }
    };

    result.map_err(|_| VerificationError::BadSignature)
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}
