// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase Auth (GoTrue) client.
//!
//! Handles:
//! - Password sign-in and sign-up with email confirmation redirect
//! - OAuth authorize URLs and callback completion
//! - Token refresh when the access token is close to expiry
//! - Broadcasting auth state changes to subscribers

use crate::auth::provider::{
    AuthError, AuthEvent, IdentityProvider, OAuthProvider, SignUpData, Subscription,
    EVENT_CHANNEL_CAPACITY,
};
use crate::models::{AuthUser, Session};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Refresh tokens when they expire within this many seconds (5 minutes).
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// Session shared between the auth client and anything that needs its token.
pub type SessionCell = Arc<RwLock<Option<Session>>>;

/// Where the app lands after a completed OAuth callback.
pub const POST_LOGIN_PATH: &str = "/dashboard";

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    refresh_token: String,
    user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| now_unix() + self.expires_in);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up returns a session when confirmation is off, a bare user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

/// GoTrue error bodies come in a few shapes.
#[derive(Debug, Default, Deserialize)]
struct GoTrueError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Supabase Auth client implementing [`IdentityProvider`].
#[derive(Clone)]
pub struct SupabaseAuth {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session: SessionCell,
    events: broadcast::Sender<AuthEvent>,
    /// Serializes refreshes so one expiring token is refreshed once.
    refresh_lock: Arc<Mutex<()>>,
}

impl SupabaseAuth {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            session: Arc::new(RwLock::new(None)),
            events,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Shared handle on the current session (for authorizing data requests).
    pub fn session_cell(&self) -> SessionCell {
        self.session.clone()
    }

    /// Seed a previously persisted session without emitting an event.
    pub async fn restore_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    /// Turn the tokens from an OAuth callback into a session.
    ///
    /// Emits `SIGNED_IN` and returns the path to navigate to.
    pub async fn complete_oauth_callback(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in: i64,
    ) -> Result<&'static str, AuthError> {
        let user: AuthUser = self
            .send_json(
                self.http
                    .get(self.auth_url("user"))
                    .header("apikey", &self.api_key)
                    .bearer_auth(access_token),
            )
            .await?;

        let session = Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            token_type: default_token_type(),
            expires_at: now_unix() + expires_in,
            user,
        };
        tracing::info!(user_id = %session.user.id, "OAuth callback completed");
        self.set_session(Some(session.clone())).await;
        self.emit(AuthEvent::signed_in(session));
        Ok(POST_LOGIN_PATH)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    async fn set_session(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, AuthError> {
        let response = builder
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let response = check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| AuthError::Transport(format!("Failed to parse auth response: {}", e)))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let token: TokenResponse = self
            .send_json(
                self.http
                    .post(self.auth_url("token"))
                    .query(&[("grant_type", "refresh_token")])
                    .header("apikey", &self.api_key)
                    .json(&serde_json::json!({ "refresh_token": refresh_token })),
            )
            .await?;
        Ok(token.into_session())
    }
}

/// Check response status and turn error bodies into [`AuthError::Provider`].
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let parsed: GoTrueError = serde_json::from_str(&body).unwrap_or_default();

    let message = parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or_else(|| parsed.error.clone())
        .unwrap_or_else(|| format!("HTTP {}", status));
    let code = parsed.error_code.or(parsed.error);

    Err(AuthError::Provider {
        status,
        code,
        message,
    })
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let current = self.session.read().await.clone();
        let Some(session) = current else {
            return Ok(None);
        };
        if !session.expires_within(now_unix(), REFRESH_MARGIN_SECS) {
            return Ok(Some(session));
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed or signed out while we waited
        let Some(session) = self.session.read().await.clone() else {
            return Ok(None);
        };
        if !session.expires_within(now_unix(), REFRESH_MARGIN_SECS) {
            return Ok(Some(session));
        }

        tracing::debug!(user_id = %session.user.id, "Access token near expiry, refreshing");
        match self.refresh(&session.refresh_token).await {
            Ok(refreshed) => {
                self.set_session(Some(refreshed.clone())).await;
                self.emit(AuthEvent::token_refreshed(refreshed.clone()));
                tracing::info!(user_id = %refreshed.user.id, "Session refreshed");
                Ok(Some(refreshed))
            }
            Err(e @ AuthError::Provider { .. }) => {
                tracing::warn!(error = %e, "Refresh token rejected, signing out");
                self.set_session(None).await;
                self.emit(AuthEvent::signed_out());
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn on_auth_state_change(&self) -> Subscription {
        Subscription::new(self.events.subscribe())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let token: TokenResponse = self
            .send_json(
                self.http
                    .post(self.auth_url("token"))
                    .query(&[("grant_type", "password")])
                    .header("apikey", &self.api_key)
                    .json(&serde_json::json!({ "email": email, "password": password })),
            )
            .await?;

        let session = token.into_session();
        self.set_session(Some(session.clone())).await;
        self.emit(AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &str,
    ) -> Result<SignUpData, AuthError> {
        let response: SignUpResponse = self
            .send_json(
                self.http
                    .post(self.auth_url("signup"))
                    .query(&[("redirect_to", redirect_to)])
                    .header("apikey", &self.api_key)
                    .json(&serde_json::json!({ "email": email, "password": password })),
            )
            .await?;

        match response {
            SignUpResponse::Session(token) => {
                let session = token.into_session();
                self.set_session(Some(session.clone())).await;
                self.emit(AuthEvent::signed_in(session.clone()));
                Ok(SignUpData {
                    user: Some(session.user.clone()),
                    session: Some(session),
                })
            }
            SignUpResponse::User(user) => Ok(SignUpData {
                user: Some(user),
                session: None,
            }),
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        // Serialized with token refresh
        let _guard = self.refresh_lock.lock().await;
        let current = self.session.read().await.clone();
        if let Some(session) = current {
            let response = self
                .http
                .post(self.auth_url("logout"))
                .header("apikey", &self.api_key)
                .bearer_auth(&session.access_token)
                .send()
                .await
                .map_err(|e| AuthError::Transport(e.to_string()))?;

            // Expired or unknown sessions are already signed out server-side
            let status = response.status().as_u16();
            if !matches!(status, 401 | 403 | 404) {
                check_response(response).await?;
            }
        }

        self.set_session(None).await;
        self.emit(AuthEvent::signed_out());
        Ok(())
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<Option<String>, AuthError> {
        let url = format!(
            "{}?provider={}&redirect_to={}",
            self.auth_url("authorize"),
            provider.as_str(),
            urlencoding::encode(redirect_to)
        );
        Ok(Some(url))
    }
}
