pub mod jwt;
pub mod password;

use std::fmt;

pub use jwt::{extract_bearer, Claims, TokenIssuer, TokenVerifier};

/// Verified caller identity: the `sub` claim of an accepted token.
///
/// Used only as a lookup key. The admission gate inserts it into request
/// extensions for downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
