//! Admin key verification for the script execution endpoints.

mod extractor;

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

pub use extractor::AdminAuth;

/// Configured admin key. `Debug` never prints the value and the memory is
/// zeroed on drop.
#[derive(Clone)]
pub struct AdminKey(Option<SecretString>);

impl AdminKey {
    pub fn new(key: Option<String>) -> Self {
        Self(key.map(SecretString::from))
    }

    /// Whether a key is configured at all; without one execution is disabled.
    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }

    /// Constant-time comparison with the configured key.
    pub fn verify(&self, provided: &str) -> bool {
        match &self.0 {
            Some(secret) => secret
                .expose_secret()
                .as_bytes()
                .ct_eq(provided.as_bytes())
                .into(),
            None => false,
        }
    }
}

impl std::fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(_) => write!(f, "AdminKey([REDACTED])"),
            None => write!(f, "AdminKey(None)"),
        }
    }
}
