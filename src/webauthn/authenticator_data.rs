//! Authenticator data parsing
//!
//! Layout:
//! - 32 bytes: RP ID hash
//! - 1 byte: flags
//! - 4 bytes: signature counter (big endian)
//! - variable: attested credential data (when the AT flag is set)
//!   - 16 bytes: AAGUID
//!   - 2 bytes: credential ID length (L)
//!   - L bytes: credential ID
//!   - variable: COSE public key (one CBOR item)
//! - variable: extensions (when the ED flag is set)

use ciborium::value::Value;

use crate::error::VerificationError;

pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_USER_VERIFIED: u8 = 0x04;
pub const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
pub const FLAG_EXTENSION_DATA: u8 = 0x80;

const HEADER_LEN: usize = 37;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub counter: u32,
    pub attested_credential: Option<AttestedCredentialData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// Raw COSE key bytes, exactly as the authenticator encoded them
    pub public_key: Vec<u8>,
}

impl AuthenticatorData {
    /// Parse raw authenticator data
    ///
    /// # Errors
    /// Returns `VerificationError::AuthenticatorData` on truncated or malformed input
    pub fn parse(bytes: &[u8]) -> Result<Self, VerificationError> {
        if bytes.len() < HEADER_LEN {
            return Err(malformed("authenticator data too short"));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let counter = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested_credential = if flags & FLAG_ATTESTED_CREDENTIAL_DATA == 0 {
            None
        } else {
            Some(parse_attested_credential(&bytes[HEADER_LEN..])?)
        };

        Ok(Self {
            rp_id_hash,
            flags,
            counter,
            attested_credential,
        })
    }

    #[must_use]
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    #[must_use]
    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }

    /// Check the RP ID hash and the presence/verification flags
    ///
    /// # Errors
    /// Returns the first failed check
    pub fn check(
        &self,
        expected_rp_id_hash: &[u8],
        require_user_verification: bool,
    ) -> Result<(), VerificationError> {
        if self.rp_id_hash.as_slice() != expected_rp_id_hash {
            return Err(malformed("RP ID hash mismatch"));
        }
        if !self.user_present() {
            return Err(VerificationError::UserNotPresent);
        }
        if require_user_verification && !self.user_verified() {
            return Err(VerificationError::UserNotVerified);
        }
        Ok(())
    }
}

fn parse_attested_credential(bytes: &[u8]) -> Result<AttestedCredentialData, VerificationError> {
    if bytes.len() < 18 {
        return Err(malformed("attested credential data too short"));
    }

    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&bytes[..16]);
    let id_len = usize::from(u16::from_be_bytes([bytes[16], bytes[17]]));

    let rest = &bytes[18..];
    if rest.len() < id_len {
        return Err(malformed("credential ID truncated"));
    }
    let (credential_id, key_and_extensions) = rest.split_at(id_len);

    // Read exactly one CBOR item so trailing extension data is not swallowed
    let mut reader = key_and_extensions;
    let _: Value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| malformed(&format!("invalid credential public key: {e}")))?;
    let key_len = key_and_extensions.len() - reader.len();

    Ok(AttestedCredentialData {
        aaguid,
        credential_id: credential_id.to_vec(),
        public_key: key_and_extensions[..key_len].to_vec(),
    })
}

fn malformed(reason: &str) -> VerificationError {
    VerificationError::AuthenticatorData(reason.to_string())
}
