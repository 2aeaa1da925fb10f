//! CBOR processing for `WebAuthn`
//!
//! Decodes attestation objects and COSE public keys.

use ciborium::de::from_reader;
use ciborium::value::{Integer, Value};

use super::types::cose_alg;
use crate::error::VerificationError;

// COSE key labels (RFC 9053)
const COSE_KTY: i64 = 1;
const COSE_ALG: i64 = 3;
const COSE_CRV_OR_N: i64 = -1;
const COSE_X_OR_E: i64 = -2;
const COSE_Y: i64 = -3;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;

/// Decoded `attestationObject`
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
    pub auth_data: Vec<u8>,
}

impl AttestationObject {
    /// Look up a text-keyed attestation statement entry
    #[must_use]
    pub fn statement(&self, key: &str) -> Option<&Value> {
        self.att_stmt
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }
}

/// Parse an `attestationObject` CBOR map
///
/// # Errors
/// Returns `VerificationError::Attestation` if the map or a required entry is missing
pub fn parse_attestation_object(bytes: &[u8]) -> Result<AttestationObject, VerificationError> {
    let value: Value = from_reader(bytes)
        .map_err(|_| VerificationError::Encoding("invalid CBOR attestation object".to_string()))?;

    let Some(map) = value.as_map() else {
        return Err(attestation("attestation object is not a map"));
    };
    let field = |name: &str| {
        map.iter()
            .find(|(k, _)| k.as_text() == Some(name))
            .map(|(_, v)| v)
    };

    let Some(fmt) = field("fmt").and_then(Value::as_text) else {
        return Err(attestation("missing fmt"));
    };
    let Some(att_stmt) = field("attStmt").and_then(Value::as_map) else {
        return Err(attestation("missing attStmt"));
    };
    let Some(auth_data) = field("authData").and_then(Value::as_bytes) else {
        return Err(attestation("missing authData"));
    };

    Ok(AttestationObject {
        fmt: fmt.to_string(),
        att_stmt: att_stmt.clone(),
        auth_data: auth_data.clone(),
    })
}

/// Public key material decoded from a COSE key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    /// P-256 point coordinates
    Ec2 { alg: i64, x: Vec<u8>, y: Vec<u8> },
    /// RSA modulus and public exponent
    Rsa { alg: i64, n: Vec<u8>, e: Vec<u8> },
    /// Ed25519 public key
    Okp { alg: i64, x: Vec<u8> },
}

impl CoseKey {
    #[must_use]
    pub fn algorithm(&self) -> i64 {
        match self {
            CoseKey::Ec2 { alg, .. } | CoseKey::Rsa { alg, .. } | CoseKey::Okp { alg, .. } => *alg,
        }
    }
}

/// Parse a COSE-encoded public key
///
/// # Errors
/// Returns `VerificationError::UnsupportedAlgorithm` for key types or algorithms
/// other than ES256, RS256 and `EdDSA`, and `VerificationError::Encoding` for
/// malformed keys
pub fn parse_cose_key(bytes: &[u8]) -> Result<CoseKey, VerificationError> {
    let value: Value = from_reader(bytes)
        .map_err(|_| VerificationError::Encoding("invalid CBOR public key".to_string()))?;
    let Some(map) = value.as_map() else {
        return Err(VerificationError::Encoding("COSE key is not a map".to_string()));
    };

    let kty = int_entry(map, COSE_KTY).ok_or_else(|| key_error("missing kty"))?;
    let alg = int_entry(map, COSE_ALG).ok_or_else(|| key_error("missing alg"))?;

    match (kty, alg) {
        (KTY_EC2, cose_alg::ES256) => {
            if int_entry(map, COSE_CRV_OR_N) != Some(CRV_P256) {
                return Err(key_error("ES256 key must use P-256"));
            }
            let x = bytes_entry(map, COSE_X_OR_E).ok_or_else(|| key_error("missing x"))?;
            let y = bytes_entry(map, COSE_Y).ok_or_else(|| key_error("missing y"))?;
            if x.len() != 32 || y.len() != 32 {
                return Err(key_error("P-256 coordinates must be 32 bytes"));
            }
            Ok(CoseKey::Ec2 { alg, x, y })
        }
        (KTY_RSA, cose_alg::RS256) => {
            let n = bytes_entry(map, COSE_CRV_OR_N).ok_or_else(|| key_error("missing n"))?;
            let e = bytes_entry(map, COSE_X_OR_E).ok_or_else(|| key_error("missing e"))?;
            Ok(CoseKey::Rsa { alg, n, e })
        }
        (KTY_OKP, cose_alg::EDDSA) => {
            if int_entry(map, COSE_CRV_OR_N) != Some(CRV_ED25519) {
                return Err(key_error("EdDSA key must use Ed25519"));
            }
            let x = bytes_entry(map, COSE_X_OR_E).ok_or_else(|| key_error("missing x"))?;
            Ok(CoseKey::Okp { alg, x })
        }
        (_, alg) => Err(VerificationError::UnsupportedAlgorithm(alg)),
    }
}

/// Read an integer value as `i64`
#[must_use]
pub fn as_i64(value: &Value) -> Option<i64> {
    value
        .as_integer()
        .and_then(|int| i64::try_from(i128::from(int)).ok())
}

fn entry(map: &[(Value, Value)], label: i64) -> Option<&Value> {
    let label = Integer::from(label);
    map.iter()
        .find(|(k, _)| k.as_integer() == Some(label))
        .map(|(_, v)| v)
}

fn int_entry(map: &[(Value, Value)], label: i64) -> Option<i64> {
    entry(map, label).and_then(as_i64)
}

fn bytes_entry(map: &[(Value, Value)], label: i64) -> Option<Vec<u8>> {
    entry(map, label).and_then(Value::as_bytes).cloned()
}

fn attestation(reason: &str) -> VerificationError {
    VerificationError::Attestation(reason.to_string())
}

fn key_error(reason: &str) -> VerificationError {
    VerificationError::Encoding(format!("COSE key: {reason}"))
}
