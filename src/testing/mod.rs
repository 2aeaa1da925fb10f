//! Testing utilities for passkey-rp
//!
//! Available to unit tests and, with the `testing` feature, to integration tests.
//!
//! ## Organization
//!
//! - [`authenticator`] - Software authenticator producing real WebAuthn payloads
//! - [`fixtures`] - Pre-built settings and coordinators
//! - [`mock`] - Fault-injecting store and a verifier that can hold calls
//!
//! ## Usage
//!
//! ```rust
//! use passkey_rp::testing::{SoftAuthenticator, TestFixtures, TEST_LOGIN};
//!
//! # async fn example() {
//! let coordinator = TestFixtures::coordinator();
//! let mut authenticator = SoftAuthenticator::new();
//!
//! TestFixtures::register(&coordinator, TEST_LOGIN, &authenticator).await;
//! let outcome = TestFixtures::authenticate(&coordinator, TEST_LOGIN, &mut authenticator).await;
//! assert!(outcome.verified);
//! # }
//! ```

pub mod authenticator;
pub mod fixtures;
pub mod mock;

// Re-export commonly used items for convenience
pub use authenticator::SoftAuthenticator;
pub use constants::*;
pub use fixtures::TestFixtures;
pub use mock::{FlakyStore, GatedVerifier};

/// Common test constants
pub mod constants {
    /// Relying party id used by fixtures and the soft authenticator
    pub const TEST_RP_ID: &str = "localhost";

    /// Origin the soft authenticator reports in client data
    pub const TEST_ORIGIN: &str = "http://localhost:8000";

    /// Default test login
    pub const TEST_LOGIN: &str = "alice";

    /// Second login for cross-user tests
    pub const OTHER_LOGIN: &str = "bob";
}
