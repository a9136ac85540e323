//! Connection authentication.
//!
//! Token verification is an external collaborator behind the
//! [`AuthProvider`] trait. The shipped [`DevTokenAuth`] accepts tokens of
//! the form `user:<uuid>`, which is enough for local development and tests.

use uuid::Uuid;

/// Verifies a client-supplied token and resolves it to a user identity.
pub trait AuthProvider: Send + Sync {
    /// Returns the authenticated user id, or `None` when the token is
    /// invalid.
    fn authenticate(&self, token: &str) -> Option<Uuid>;
}

/// Development-only provider accepting `user:<uuid>` tokens.
#[derive(Debug, Default)]
pub struct DevTokenAuth;

impl AuthProvider for DevTokenAuth {
    fn authenticate(&self, token: &str) -> Option<Uuid> {
        token
            .strip_prefix("user:")
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}
