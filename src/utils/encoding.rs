//! Base64url glue
//!
//! Every binary value that crosses the wire (challenges, credential ids, user
//! handles, public keys) travels as unpadded base64url. Browsers and some client
//! libraries still append `=` padding, so decoding accepts both forms.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Encode bytes as unpadded base64url
#[must_use]
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url, with or without trailing padding
///
/// # Errors
/// Returns an error if the input is not valid base64url
pub fn decode(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('='))
}

/// Serde adapter for `Vec<u8>` fields stored as base64url strings
pub mod base64url {
    use serde::{Deserialize, Deserializer, Serializer};

    /// # Errors
    /// Propagates serializer errors
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    /// # Errors
    /// Fails if the value is not a base64url string
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        super::decode(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Declare an opaque byte-string newtype that serializes as base64url
macro_rules! base64url_bytes {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Vec<u8>);

        impl $name {
            #[must_use]
            pub fn new(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }

            #[must_use]
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            #[must_use]
            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }

            #[must_use]
            pub fn to_base64url(&self) -> String {
                $crate::utils::encoding::encode(&self.0)
            }

            /// # Errors
            /// Returns an error if the input is not valid base64url
            pub fn from_base64url(encoded: &str) -> Result<Self, base64::DecodeError> {
                $crate::utils::encoding::decode(encoded).map(Self)
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_base64url())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_base64url())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_base64url())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let encoded = <String as serde::Deserialize>::deserialize(deserializer)?;
                Self::from_base64url(&encoded).map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use base64url_bytes;
