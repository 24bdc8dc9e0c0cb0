//! Token verification seam.
//!
//! The actual crypto (bcrypt, JWT signing) lives in the external auth
//! service; the orchestrator only needs a verifier that maps a bearer token
//! to a user and role.

use strato_core::{UserId, UserRole};

/// Verified caller identity.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated user.
    pub user_id: UserId,
    /// Role attached to the token.
    pub role: UserRole,
}

/// Verifies inbound tokens.
pub trait AuthVerifier: Send + Sync {
    /// Verify a token for `claimed_user`. `None` means rejected.
    fn verify(&self, token: &str, claimed_user: &str) -> Option<AuthContext>;

    /// Verify an admin token.
    fn verify_admin(&self, token: &str) -> Option<AuthContext>;
}

/// Static-token verifier for self-hosted single-operator deployments.
///
/// A shared client token admits any user id; the admin token grants the
/// admin role. Empty configured tokens disable the corresponding check
/// (development mode).
pub struct StaticTokenVerifier {
    client_token: String,
    admin_token: String,
}

impl StaticTokenVerifier {
    /// Create a verifier from the configured tokens.
    #[must_use]
    pub fn new(client_token: impl Into<String>, admin_token: impl Into<String>) -> Self {
        Self {
            client_token: client_token.into(),
            admin_token: admin_token.into(),
        }
    }

    /// Read tokens from `STRATO_CLIENT_TOKEN` / `STRATO_ADMIN_TOKEN`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("STRATO_CLIENT_TOKEN").unwrap_or_default(),
            std::env::var("STRATO_ADMIN_TOKEN").unwrap_or_default(),
        )
    }
}

impl AuthVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str, claimed_user: &str) -> Option<AuthContext> {
        if !self.client_token.is_empty() && token != self.client_token {
            return None;
        }
        Some(AuthContext {
            user_id: UserId::new(claimed_user),
            role: UserRole::Standard,
        })
    }

    fn verify_admin(&self, token: &str) -> Option<AuthContext> {
        if self.admin_token.is_empty() || token != self.admin_token {
            return None;
        }
        Some(AuthContext {
            user_id: UserId::new("admin"),
            role: UserRole::Admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_token_enforced() {
        let verifier = StaticTokenVerifier::new("secret", "admin-secret");
        assert!(verifier.verify("secret", "u1").is_some());
        assert!(verifier.verify("wrong", "u1").is_none());
    }

    #[test]
    fn test_empty_client_token_is_open() {
        let verifier = StaticTokenVerifier::new("", "admin-secret");
        assert!(verifier.verify("anything", "u1").is_some());
    }

    #[test]
    fn test_admin_token_never_open() {
        let verifier = StaticTokenVerifier::new("", "");
        assert!(verifier.verify_admin("anything").is_none());

        let verifier = StaticTokenVerifier::new("", "admin-secret");
        assert!(verifier.verify_admin("admin-secret").is_some());
        assert!(verifier.verify_admin("nope").is_none());
    }
}
