//! Identity provider session and user records.

use serde::{Deserialize, Serialize};

/// Identity record issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable provider user ID (also the profile key)
    pub id: String,
    /// Email address (absent for some OAuth identities)
    #[serde(default)]
    pub email: Option<String>,
    /// Provider-issued metadata, passed through untouched
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    /// Display name used when a profile is created for this user.
    ///
    /// The local part of the email address, or "User" without one.
    pub fn default_display_name(&self) -> String {
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or("User")
            .to_string()
    }
}

/// Provider session: proof of authentication for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token expiry (Unix timestamp, seconds)
    pub expires_at: i64,
    pub user: AuthUser,
}

impl Session {
    /// Whether the access token expires within `margin_secs` of `now`.
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        now + margin_secs >= self.expires_at
    }
}
