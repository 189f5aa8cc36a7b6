//! Identity resolution for inbound connections.
//!
//! Runs exactly once at WebSocket upgrade: a bearer token is verified
//! against the shared signing secret, a guest display name is accepted
//! unverified with a freshly minted per-connection identifier.

use serde::Serialize;
use uuid::Uuid;

use crate::auth::jwt;

/// Trust tier of a resolved identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    Authenticated,
    Guest,
}

/// A resolved user identity for one connection.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: String,
    pub display_name: String,
    pub tier: TrustTier,
}

/// Authentication failure. Fatal to the connection attempt only.
#[derive(Debug)]
pub enum AuthError {
    /// Neither a token nor a guest name was supplied
    MissingCredentials,
    /// Token failed validation (bad signature, malformed, expired)
    InvalidToken(jsonwebtoken::errors::Error),
    /// Guest connections are disabled by config
    GuestAccessDisabled,
    /// Guest display name was empty
    EmptyGuestName,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingCredentials => write!(f, "Missing credentials"),
            AuthError::InvalidToken(e) => write!(f, "Invalid token: {}", e),
            AuthError::GuestAccessDisabled => write!(f, "Guest access is disabled"),
            AuthError::EmptyGuestName => write!(f, "Guest name must not be empty"),
        }
    }
}

impl AuthError {
    /// True when the underlying cause is an expired token signature.
    pub fn is_expired(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidToken(e)
                if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature)
        )
    }
}

/// Resolve connection credentials to a UserIdentity.
///
/// Token mode delegates to JWT validation. Guest mode generates a fresh
/// UUIDv7 user id per connection; guest ids are never reused across
/// reconnects.
pub fn authenticate(
    jwt_secret: &[u8],
    guest_access: bool,
    token: Option<&str>,
    guest_name: Option<&str>,
) -> Result<UserIdentity, AuthError> {
    if let Some(token) = token {
        let claims = jwt::validate_access_token(jwt_secret, token).map_err(AuthError::InvalidToken)?;
        let display_name = claims.name.unwrap_or_else(|| claims.sub.clone());
        return Ok(UserIdentity {
            user_id: claims.sub,
            display_name,
            tier: TrustTier::Authenticated,
        });
    }

    if let Some(name) = guest_name {
        if !guest_access {
            return Err(AuthError::GuestAccessDisabled);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::EmptyGuestName);
        }
        return Ok(UserIdentity {
            user_id: Uuid::now_v7().to_string(),
            display_name: name.to_string(),
            tier: TrustTier::Guest,
        });
    }

    Err(AuthError::MissingCredentials)
}
