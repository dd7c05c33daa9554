// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use ecopilot::auth::{
    AuthError, AuthEvent, IdentityProvider, OAuthProvider, SignUpData, Subscription,
};
use ecopilot::config::Config;
use ecopilot::db::MemoryDb;
use ecopilot::middleware::auth::create_access_token;
use ecopilot::models::{AuthUser, Session};
use ecopilot::routes::create_router;
use ecopilot::services::{ClassifierClient, MapsService, ReportService};
use ecopilot::AppState;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Password the mock provider accepts.
#[allow(dead_code)]
pub const GOOD_PASSWORD: &str = "correct-horse";

/// Create a test app with in-memory stores and no Google API keys.
/// Returns the router, the shared state and the backing store.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MemoryDb>) {
    let config = Config::test_default();
    let db = Arc::new(MemoryDb::new());

    let state = Arc::new(AppState {
        maps: MapsService::with_endpoint("http://127.0.0.1:9", None),
        classifier: ClassifierClient::new(None),
        reports: ReportService::new(db.clone(), db.clone(), db.clone()),
        profiles: db.clone(),
        config,
    });

    (create_router(state.clone()), state, db)
}

/// Access token for `user_id`, signed with the test config's secret.
#[allow(dead_code)]
pub fn test_token(user_id: &str) -> String {
    let config = Config::test_default();
    create_access_token(
        user_id,
        Some(&format!("{}@example.com", user_id)),
        &config.supabase_jwt_secret,
        3600,
    )
    .unwrap()
}

#[allow(dead_code)]
pub fn test_user(id: &str) -> AuthUser {
    AuthUser {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        user_metadata: serde_json::Value::Null,
    }
}

#[allow(dead_code)]
pub fn test_session(id: &str, access_token: &str) -> Session {
    Session {
        access_token: access_token.to_string(),
        refresh_token: format!("refresh-{}", id),
        token_type: "bearer".to_string(),
        expires_at: chrono::Utc::now().timestamp() + 3600,
        user: test_user(id),
    }
}

/// Scripted identity provider.
///
/// Accepts [`GOOD_PASSWORD`] for any email (user ID = email local part) and
/// echoes auth events the way the real provider does.
#[allow(dead_code)]
pub struct MockProvider {
    events: broadcast::Sender<AuthEvent>,
    session: Mutex<Option<Session>>,
    hang_get_session: AtomicBool,
    fail_sign_out: AtomicBool,
    oauth_url: Mutex<Option<String>>,
    pub sign_in_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    pub last_redirect: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl MockProvider {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            events,
            session: Mutex::new(None),
            hang_get_session: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            oauth_url: Mutex::new(Some(
                "https://auth.example.com/authorize?provider=google".to_string(),
            )),
            sign_in_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            last_redirect: Mutex::new(None),
        })
    }

    /// Provider with an existing session (as if restored from storage).
    pub fn with_session(session: Session) -> Arc<Self> {
        let provider = Self::new();
        *provider.session.lock().unwrap() = Some(session);
        provider
    }

    /// `get_session` never resolves.
    pub fn hang_get_session(&self) {
        self.hang_get_session.store(true, Ordering::SeqCst);
    }

    pub fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    pub fn set_oauth_url(&self, url: Option<&str>) {
        *self.oauth_url.lock().unwrap() = url.map(String::from);
    }

    /// Push an event as if the provider emitted it.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        if self.hang_get_session.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self.session.lock().unwrap().clone())
    }

    fn on_auth_state_change(&self) -> Subscription {
        Subscription::new(self.events.subscribe())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        if password != GOOD_PASSWORD {
            return Err(AuthError::provider(400, "Invalid login credentials"));
        }

        let id = email.split('@').next().unwrap_or(email);
        let session = test_session(id, &format!("token-{}", id));
        *self.session.lock().unwrap() = Some(session.clone());
        self.emit(AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        redirect_to: &str,
    ) -> Result<SignUpData, AuthError> {
        *self.last_redirect.lock().unwrap() = Some(redirect_to.to_string());
        if email == "taken@example.com" {
            return Err(AuthError::provider(422, "User already registered"));
        }
        let id = email.split('@').next().unwrap_or(email);
        Ok(SignUpData {
            user: Some(test_user(id)),
            session: None,
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AuthError::Transport("network unreachable".to_string()));
        }
        *self.session.lock().unwrap() = None;
        self.emit(AuthEvent::signed_out());
        Ok(())
    }

    async fn sign_in_with_oauth(
        &self,
        _provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<Option<String>, AuthError> {
        *self.last_redirect.lock().unwrap() = Some(redirect_to.to_string());
        Ok(self.oauth_url.lock().unwrap().clone())
    }
}
