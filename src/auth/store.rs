// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-wide auth store mirroring the identity provider's session.
//!
//! State lives in a `watch` channel so readers get a synchronous snapshot
//! ([`AuthStore::state`]) or can await changes ([`AuthStore::subscribe`]).
//! Only this module writes it. Provider events are consumed by a background
//! listener for the lifetime of the store; user-facing notices and
//! navigation requests go out on a separate broadcast channel.

use crate::auth::profile::resolve_profile;
use crate::auth::provider::{
    AuthError, AuthEvent, AuthEventKind, IdentityProvider, OAuthProvider, SignUpData,
    Subscription,
};
use crate::db::ProfileStore;
use crate::models::{AuthUser, ProfilePatch, Session, UserProfile};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Initialization gives up waiting for the provider after this long.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(5);

const UI_CHANNEL_CAPACITY: usize = 32;

/// Store lifecycle. Never returns to `Initializing` once `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Uninitialized,
    Initializing,
    Ready,
}

/// Snapshot of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub user: Option<AuthUser>,
    pub user_profile: Option<UserProfile>,
    pub loading: bool,
    pub phase: AuthPhase,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            user: None,
            user_profile: None,
            loading: true,
            phase: AuthPhase::Uninitialized,
        }
    }
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    fn clear(&mut self) {
        self.session = None;
        self.user = None;
        self.user_profile = None;
    }

    /// Profile is dropped when the session belongs to a different user.
    fn set_session(&mut self, session: Session) {
        if self.user.as_ref().map(|u| u.id.as_str()) != Some(session.user.id.as_str()) {
            self.user_profile = None;
        }
        self.user = Some(session.user.clone());
        self.session = Some(session);
    }

    fn mark_ready(&mut self) {
        self.phase = AuthPhase::Ready;
        self.loading = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Failure,
}

/// Toast shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub description: String,
}

impl Notice {
    fn success(title: &str, description: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            title: title.to_string(),
            description: description.into(),
        }
    }

    fn failure(title: &str, description: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Failure,
            title: title.to_string(),
            description: description.into(),
        }
    }
}

/// Side effects requested of the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Toast(Notice),
    /// Full navigation to a path or external URL.
    Navigate(String),
}

/// Auth store. Create with [`AuthStore::start`] and share the `Arc`.
pub struct AuthStore {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    /// Auth callback URL for sign-up confirmation and OAuth.
    redirect_url: String,
    state: watch::Sender<AuthState>,
    ui: broadcast::Sender<UiEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AuthStore {
    /// Create the store, subscribe to provider events and begin initialization.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        redirect_url: impl Into<String>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(AuthState::default());
        let (ui, _) = broadcast::channel(UI_CHANNEL_CAPACITY);

        let store = Arc::new(Self {
            provider,
            profiles,
            redirect_url: redirect_url.into(),
            state,
            ui,
            tasks: Mutex::new(Vec::new()),
        });

        store.state.send_modify(|s| s.phase = AuthPhase::Initializing);

        // Subscribe before fetching the session so no event is missed
        let subscription = store.provider.on_auth_state_change();
        let listener = tokio::spawn(listen(Arc::downgrade(&store), subscription));
        let init = tokio::spawn(initialize(Arc::downgrade(&store)));

        store.lock_tasks().extend([listener, init]);
        store
    }

    /// Stop listening to provider events.
    pub fn shutdown(&self) {
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current snapshot.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn ui_events(&self) -> broadcast::Receiver<UiEvent> {
        self.ui.subscribe()
    }

    /// Wait until initialization finished (or timed out).
    pub async fn wait_until_ready(&self) -> AuthState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|s| s.phase == AuthPhase::Ready).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    /// Password sign-in. State holds the new session before this returns.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        tracing::info!(email, "Attempting sign in");
        let session = match self.provider.sign_in_with_password(email, password).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(email, error = %e, "Sign in failed");
                self.notify(Notice::failure("Sign in failed", e.to_string()));
                return Err(e);
            }
        };

        self.state.send_modify(|s| s.set_session(session.clone()));
        self.load_profile(&session.user).await;

        self.notify(Notice::success(
            "Signed in successfully",
            format!("Welcome back, {}!", email),
        ));
        Ok(session)
    }

    /// Register a new account. No profile is created until first sign-in.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpData, AuthError> {
        match self
            .provider
            .sign_up(email, password, &self.redirect_url)
            .await
        {
            Ok(data) => {
                tracing::info!(email, confirmed = data.session.is_some(), "Signed up");
                self.notify(Notice::success(
                    "Sign up successful",
                    "Please check your email to confirm your account.",
                ));
                Ok(data)
            }
            Err(e) => {
                tracing::warn!(email, error = %e, "Sign up failed");
                self.notify(Notice::failure("Sign up failed", e.to_string()));
                Err(e)
            }
        }
    }

    /// Sign out. On provider error the state is left as it was.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        if let Err(e) = self.provider.sign_out().await {
            tracing::warn!(error = %e, "Sign out failed");
            self.notify(Notice::failure("Sign out failed", e.to_string()));
            return Err(e);
        }

        self.state.send_modify(AuthState::clear);
        self.emit(UiEvent::Navigate("/".to_string()));
        Ok(())
    }

    /// Start the Google OAuth flow. Returns the URL the browser is sent to.
    pub async fn sign_in_with_google(&self) -> Result<String, AuthError> {
        let result = self
            .provider
            .sign_in_with_oauth(OAuthProvider::Google, &self.redirect_url)
            .await
            .and_then(|url| url.ok_or(AuthError::MissingRedirectUrl));

        match result {
            Ok(url) => {
                tracing::debug!(url = %url, "Redirecting to OAuth provider");
                self.emit(UiEvent::Navigate(url.clone()));
                Ok(url)
            }
            Err(e) => {
                tracing::error!(error = %e, "Google sign in failed");
                self.notify(Notice::failure("Google sign in failed", e.to_string()));
                Err(e)
            }
        }
    }

    /// Re-resolve the current user's profile. No-op when signed out.
    pub async fn refresh_user_profile(&self) -> Option<UserProfile> {
        let user = self.state.borrow().user.clone()?;
        self.load_profile(&user).await
    }

    /// Edit the signed-in user's name and/or avatar.
    pub async fn update_profile(
        &self,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<UserProfile, AuthError> {
        let user = self
            .state
            .borrow()
            .user
            .clone()
            .ok_or(AuthError::NotSignedIn)?;

        let patch = ProfilePatch {
            name,
            avatar_url,
            ..ProfilePatch::default()
        };

        match self.profiles.update_profile(&user.id, &patch).await {
            Ok(profile) => {
                self.apply_profile(&user.id, Some(profile.clone()));
                self.notify(Notice::success(
                    "Profile updated",
                    "Your profile has been saved.",
                ));
                Ok(profile)
            }
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Profile update failed");
                self.notify(Notice::failure("Profile update failed", e.to_string()));
                Err(AuthError::Profile(e))
            }
        }
    }

    async fn handle_event(&self, event: AuthEvent) {
        tracing::debug!(kind = ?event.kind, "Auth state changed");

        match (event.kind, event.session) {
            (AuthEventKind::SignedIn, Some(session)) => {
                let user = session.user.clone();
                self.state.send_modify(|s| s.set_session(session));
                self.load_profile(&user).await;
            }
            (AuthEventKind::SignedOut, _) => {
                self.state.send_modify(AuthState::clear);
            }
            (AuthEventKind::TokenRefreshed, Some(session)) => {
                self.state.send_modify(|s| s.session = Some(session));
            }
            (AuthEventKind::UserUpdated, Some(session)) => {
                self.state.send_modify(|s| s.set_session(session));
            }
            (kind, None) => {
                tracing::warn!(kind = ?kind, "Auth event without session ignored");
            }
        }

        self.state.send_if_modified(|s| {
            let changed = s.phase != AuthPhase::Ready;
            s.mark_ready();
            changed
        });
    }

    async fn load_profile(&self, user: &AuthUser) -> Option<UserProfile> {
        let profile = resolve_profile(self.profiles.as_ref(), user).await;
        self.apply_profile(&user.id, profile.clone());
        profile
    }

    /// Store a resolved profile if `user_id` is still the signed-in user.
    fn apply_profile(&self, user_id: &str, profile: Option<UserProfile>) {
        self.state.send_if_modified(|s| {
            if s.user.as_ref().map(|u| u.id.as_str()) != Some(user_id) {
                return false;
            }
            if s.user_profile == profile {
                return false;
            }
            s.user_profile = profile;
            true
        });
    }

    fn notify(&self, notice: Notice) {
        self.emit(UiEvent::Toast(notice));
    }

    fn emit(&self, event: UiEvent) {
        let _ = self.ui.send(event);
    }
}

impl Drop for AuthStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Initial session fetch, bounded by [`INIT_TIMEOUT`].
async fn initialize(store: Weak<AuthStore>) {
    let Some(store) = store.upgrade() else {
        return;
    };

    let init = async {
        match store.provider.get_session().await {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.user.id, "Restored session");
                let user = session.user.clone();
                store.state.send_modify(|s| s.set_session(session));
                store.load_profile(&user).await;
            }
            Ok(None) => tracing::debug!("No active session"),
            Err(e) => tracing::error!(error = %e, "Error getting session"),
        }
    };

    if tokio::time::timeout(INIT_TIMEOUT, init).await.is_err() {
        tracing::warn!("Auth initialization timed out, continuing without session");
    }

    store.state.send_modify(AuthState::mark_ready);
}

/// Apply provider events until the provider or the store goes away.
async fn listen(store: Weak<AuthStore>, mut subscription: Subscription) {
    while let Some(event) = subscription.recv().await {
        let Some(store) = store.upgrade() else {
            break;
        };
        store.handle_event(event).await;
    }
    subscription.unsubscribe();
}
