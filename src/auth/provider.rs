// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider interface.
//!
//! The auth store only sees this trait. [`SupabaseAuth`] implements it over
//! the GoTrue REST API; tests plug in scripted providers.
//!
//! [`SupabaseAuth`]: crate::auth::SupabaseAuth

use crate::db::DbError;
use crate::models::{AuthUser, Session};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the provider event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Provider auth state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Event delivered on the provider's auth state stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn signed_in(session: Session) -> Self {
        Self {
            kind: AuthEventKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: AuthEventKind::SignedOut,
            session: None,
        }
    }

    pub fn token_refreshed(session: Session) -> Self {
        Self {
            kind: AuthEventKind::TokenRefreshed,
            session: Some(session),
        }
    }

    pub fn user_updated(session: Session) -> Self {
        Self {
            kind: AuthEventKind::UserUpdated,
            session: Some(session),
        }
    }
}

/// Handle on the auth state stream. Dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<AuthEvent>,
}

impl Subscription {
    pub fn new(rx: broadcast::Receiver<AuthEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the provider is gone.
    ///
    /// Lagged receivers skip the missed events and keep going.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Auth event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

/// OAuth providers the app offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
        }
    }
}

/// Result of a sign-up. `session` is `None` while email confirmation is pending.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpData {
    pub user: Option<AuthUser>,
    pub session: Option<Session>,
}

/// Identity provider errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    /// The provider rejected the request. Shown to the user as-is.
    #[error("{message}")]
    Provider {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Auth request failed: {0}")]
    Transport(String),

    #[error("No redirect URL returned from OAuth provider")]
    MissingRedirectUrl,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Profile update failed: {0}")]
    Profile(DbError),
}

impl AuthError {
    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        AuthError::Provider {
            status,
            code: None,
            message: message.into(),
        }
    }
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Current session, refreshing it first when close to expiry.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Subscribe to auth state changes.
    fn on_auth_state_change(&self) -> Subscription;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError>;

    /// Register a user; confirmation mail links back to `redirect_to`.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &str,
    ) -> Result<SignUpData, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// URL to send the browser to, if the provider produced one.
    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<Option<String>, AuthError>;
}
