//! Relying-party data model
//!
//! Users own an ordered list of credentials and at most one pending challenge.
//! Binary identifiers are opaque byte strings that serialize as base64url.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::utils::encoding::{base64url, base64url_bytes};

base64url_bytes!(
    /// Authenticator-assigned credential identifier, unique across the store
    CredentialId
);

base64url_bytes!(
    /// Opaque server-generated user handle, stable for the user's lifetime
    UserHandle
);

base64url_bytes!(
    /// Random value an authenticator must sign over
    Challenge
);

impl UserHandle {
    /// Generate a fresh 16-byte user handle
    #[must_use]
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().as_bytes().to_vec())
    }
}

/// Which ceremony a challenge was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CeremonyKind::Registration => f.write_str("registration"),
            CeremonyKind::Authentication => f.write_str("authentication"),
        }
    }
}

/// Transport hint reported by an authenticator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    SmartCard,
    Hybrid,
    Internal,
}

impl FromStr for AuthenticatorTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usb" => Ok(Self::Usb),
            "nfc" => Ok(Self::Nfc),
            "ble" => Ok(Self::Ble),
            "smart-card" => Ok(Self::SmartCard),
            "hybrid" => Ok(Self::Hybrid),
            "internal" => Ok(Self::Internal),
            other => Err(format!("unknown transport `{other}`")),
        }
    }
}

impl AuthenticatorTransport {
    /// Parse client-reported hints, dropping values this crate does not know
    pub fn parse_hints<'a>(hints: impl IntoIterator<Item = &'a String>) -> BTreeSet<Self> {
        hints
            .into_iter()
            .filter_map(|hint| match hint.parse() {
                Ok(transport) => Some(transport),
                Err(e) => {
                    log::debug!("Ignoring transport hint: {e}");
                    None
                }
            })
            .collect()
    }
}

/// A registered authenticator binding for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    /// COSE-encoded public key
    #[serde(with = "base64url")]
    pub public_key: Vec<u8>,
    /// Last accepted signature counter
    pub counter: u32,
    #[serde(default)]
    pub transports: BTreeSet<AuthenticatorTransport>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Credential {
    #[must_use]
    pub fn new(
        id: CredentialId,
        public_key: Vec<u8>,
        counter: u32,
        transports: BTreeSet<AuthenticatorTransport>,
    ) -> Self {
        Self {
            id,
            public_key,
            counter,
            transports,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }
}

/// Challenge issued by a begin call and awaiting its finish call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChallenge {
    pub challenge: Challenge,
    pub kind: CeremonyKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingChallenge {
    #[must_use]
    pub fn new(challenge: Challenge, kind: CeremonyKind, ttl: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            challenge,
            kind,
            issued_at,
            expires_at: issued_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Relying-party account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub user_handle: UserHandle,
    pub display_name: String,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub pending_challenge: Option<PendingChallenge>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Provision a new account with no credentials
    #[must_use]
    pub fn new(login: &str) -> Self {
        let display_name = login
            .split('@')
            .next()
            .filter(|local| !local.is_empty())
            .unwrap_or(login)
            .to_string();

        Self {
            login: login.to_string(),
            user_handle: UserHandle::generate(),
            display_name,
            credentials: Vec::new(),
            pending_challenge: None,
            created_at: Utc::now(),
        }
    }

    /// Name presented to the authenticator
    ///
    /// Logins that already look like an address are used as-is; bare logins
    /// are scoped to the relying party.
    #[must_use]
    pub fn user_name(&self, rp_id: &str) -> String {
        if self.login.contains('@') {
            self.login.clone()
        } else {
            format!("{}@{rp_id}", self.login)
        }
    }

    #[must_use]
    pub fn find_credential(&self, id: &CredentialId) -> Option<&Credential> {
        self.credentials.iter().find(|c| &c.id == id)
    }

    #[must_use]
    pub fn has_credential(&self, id: &CredentialId) -> bool {
        self.find_credential(id).is_some()
    }
}
