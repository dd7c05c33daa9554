// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth store lifecycle tests.
//!
//! These tests verify that:
//! 1. Initialization always finishes within the failsafe timeout
//! 2. Sign-in/sign-out update state exactly as the provider reports
//! 3. Provider events are applied and profile creation is idempotent

use ecopilot::auth::{
    AuthError, AuthEvent, AuthPhase, AuthStore, IdentityProvider, NoticeKind, UiEvent,
};
use async_trait::async_trait;
use ecopilot::db::{DbError, MemoryDb, ProfileStore};
use ecopilot::models::{ProfilePatch, UserProfile};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

mod common;

use common::{test_session, MockProvider, GOOD_PASSWORD};

const CALLBACK: &str = "http://localhost:5173/auth/callback";

fn start(provider: &Arc<MockProvider>, db: &Arc<MemoryDb>) -> Arc<AuthStore> {
    let provider: Arc<dyn IdentityProvider> = provider.clone();
    AuthStore::start(provider, db.clone(), CALLBACK)
}

/// Wait (bounded) until the store state satisfies `pred`.
async fn wait_for_state(store: &AuthStore, pred: impl Fn(&ecopilot::auth::AuthState) -> bool) {
    let mut rx = store.subscribe();
    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| pred(s)))
        .await
        .expect("state condition not reached")
        .expect("store dropped");
}

async fn next_toast(rx: &mut tokio::sync::broadcast::Receiver<UiEvent>) -> (NoticeKind, String) {
    loop {
        match rx.recv().await.unwrap() {
            UiEvent::Toast(notice) => return (notice.kind, notice.title),
            UiEvent::Navigate(_) => continue,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_failsafe_ends_loading_within_five_seconds() {
    let provider = MockProvider::new();
    provider.hang_get_session();
    let db = Arc::new(MemoryDb::new());
    let started = Instant::now();

    let store = start(&provider, &db);
    assert!(store.state().loading);

    let state = store.wait_until_ready().await;

    assert!(!state.loading);
    assert_eq!(state.phase, AuthPhase::Ready);
    assert!(state.session.is_none());
    assert!(started.elapsed() <= Duration::from_millis(5000));
}

#[tokio::test]
async fn test_init_restores_existing_session_and_creates_profile() {
    let provider = MockProvider::with_session(test_session("alice", "token-alice"));
    let db = Arc::new(MemoryDb::new());

    let store = start(&provider, &db);
    let state = store.wait_until_ready().await;

    assert_eq!(state.user.as_ref().map(|u| u.id.as_str()), Some("alice"));
    let profile = state.user_profile.expect("profile resolved");
    assert_eq!(profile.points, 0);
    assert_eq!(profile.level, 1);
    assert_eq!(db.profile_count(), 1);
}

#[tokio::test]
async fn test_init_without_session_is_anonymous() {
    let provider = MockProvider::new();
    let db = Arc::new(MemoryDb::new());

    let store = start(&provider, &db);
    let state = store.wait_until_ready().await;

    assert!(!state.is_authenticated());
    assert!(!state.loading);
    assert_eq!(db.profile_reads(), 0);
}

#[tokio::test]
async fn test_sign_in_sets_state_before_returning() {
    let provider = MockProvider::new();
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    store.wait_until_ready().await;
    let mut ui = store.ui_events();

    let session = store
        .sign_in("bob@example.com", GOOD_PASSWORD)
        .await
        .unwrap();

    let state = store.state();
    assert_eq!(state.session.as_ref(), Some(&session));
    assert_eq!(state.user.as_ref().map(|u| u.id.as_str()), Some("bob"));
    assert_eq!(
        state.user_profile.as_ref().and_then(|p| p.name.as_deref()),
        Some("bob")
    );
    assert_eq!(
        next_toast(&mut ui).await,
        (NoticeKind::Success, "Signed in successfully".to_string())
    );
}

#[tokio::test]
async fn test_signed_in_echo_does_not_duplicate_profile() {
    let provider = MockProvider::new();
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    store.wait_until_ready().await;

    store
        .sign_in("carol@example.com", GOOD_PASSWORD)
        .await
        .unwrap();

    // Echo again, as a second tab would
    provider.emit(AuthEvent::signed_in(test_session("carol", "token-carol-2")));
    wait_for_state(&store, |s| {
        s.session.as_ref().map(|x| x.access_token.as_str()) == Some("token-carol-2")
    })
    .await;
    wait_for_state(&store, |s| s.user_profile.is_some()).await;

    assert_eq!(db.profile_count(), 1);
    assert_eq!(
        store.state().user_profile.map(|p| p.id),
        Some("carol".to_string())
    );
}

#[tokio::test]
async fn test_sign_in_failure_leaves_state_and_notifies() {
    let provider = MockProvider::new();
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    let before = store.wait_until_ready().await;
    let mut ui = store.ui_events();

    let err = store
        .sign_in("dave@example.com", "wrong")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Invalid login credentials");
    assert_eq!(store.state(), before);
    assert_eq!(
        next_toast(&mut ui).await,
        (NoticeKind::Failure, "Sign in failed".to_string())
    );
}

#[tokio::test]
async fn test_sign_out_success_clears_and_navigates_home() {
    let provider = MockProvider::with_session(test_session("erin", "token-erin"));
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    store.wait_until_ready().await;
    let mut ui = store.ui_events();

    store.sign_out().await.unwrap();

    let state = store.state();
    assert!(state.session.is_none());
    assert!(state.user.is_none());
    assert!(state.user_profile.is_none());
    assert_eq!(ui.recv().await.unwrap(), UiEvent::Navigate("/".to_string()));
}

#[tokio::test]
async fn test_sign_out_error_leaves_state_untouched() {
    let provider = MockProvider::with_session(test_session("frank", "token-frank"));
    provider.fail_sign_out();
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    let before = store.wait_until_ready().await;

    let err = store.sign_out().await.unwrap_err();

    assert!(matches!(err, AuthError::Transport(_)));
    assert_eq!(store.state(), before);
    assert!(store.state().is_authenticated());
}

#[tokio::test]
async fn test_sign_up_uses_callback_redirect_without_profile() {
    let provider = MockProvider::new();
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    store.wait_until_ready().await;

    let data = store.sign_up("gina@example.com", "pw").await.unwrap();

    assert!(data.session.is_none());
    assert_eq!(
        provider.last_redirect.lock().unwrap().as_deref(),
        Some(CALLBACK)
    );
    assert_eq!(db.profile_count(), 0);

    let err = store.sign_up("taken@example.com", "pw").await.unwrap_err();
    assert_eq!(err.to_string(), "User already registered");
}

#[tokio::test]
async fn test_google_sign_in_redirects() {
    let provider = MockProvider::new();
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    store.wait_until_ready().await;
    let mut ui = store.ui_events();

    let url = store.sign_in_with_google().await.unwrap();

    assert_eq!(url, "https://auth.example.com/authorize?provider=google");
    assert_eq!(ui.recv().await.unwrap(), UiEvent::Navigate(url));
}

#[tokio::test]
async fn test_google_sign_in_without_url_fails() {
    let provider = MockProvider::new();
    provider.set_oauth_url(None);
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    store.wait_until_ready().await;

    let err = store.sign_in_with_google().await.unwrap_err();

    assert_eq!(err, AuthError::MissingRedirectUrl);
}

#[tokio::test]
async fn test_provider_events_update_state() {
    let provider = MockProvider::with_session(test_session("hank", "token-1"));
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    store.wait_until_ready().await;

    // TOKEN_REFRESHED replaces only the session
    provider.emit(AuthEvent::token_refreshed(test_session("hank", "token-2")));
    wait_for_state(&store, |s| {
        s.session.as_ref().map(|x| x.access_token.as_str()) == Some("token-2")
    })
    .await;
    assert!(store.state().user_profile.is_some());

    // USER_UPDATED replaces session and user
    let mut updated = test_session("hank", "token-3");
    updated.user.email = Some("hank@new.example.com".to_string());
    provider.emit(AuthEvent::user_updated(updated));
    wait_for_state(&store, |s| {
        s.user.as_ref().and_then(|u| u.email.as_deref()) == Some("hank@new.example.com")
    })
    .await;

    // SIGNED_OUT clears everything
    provider.emit(AuthEvent::signed_out());
    wait_for_state(&store, |s| s.session.is_none()).await;
    let state = store.state();
    assert!(state.user.is_none());
    assert!(state.user_profile.is_none());
    assert_eq!(state.phase, AuthPhase::Ready);
}

/// Profile store that holds lookups for one user until released.
struct HeldProfiles {
    inner: Arc<MemoryDb>,
    held_user: String,
    release: Notify,
}

#[async_trait]
impl ProfileStore for HeldProfiles {
    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, DbError> {
        if user_id == self.held_user {
            self.release.notified().await;
        }
        self.inner.get_profile(user_id).await
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile, DbError> {
        self.inner.upsert_profile(profile).await
    }

    async fn insert_profile(&self, profile: &UserProfile) -> Result<UserProfile, DbError> {
        self.inner.insert_profile(profile).await
    }

    async fn update_profile(
        &self,
        user_id: &str,
        patch: &ProfilePatch,
    ) -> Result<UserProfile, DbError> {
        self.inner.update_profile(user_id, patch).await
    }

    async fn increment_stats(
        &self,
        user_id: &str,
        reports: u32,
        points: u32,
    ) -> Result<UserProfile, DbError> {
        self.inner.increment_stats(user_id, reports, points).await
    }
}

#[tokio::test]
async fn test_user_switch_never_shows_previous_profile() {
    let provider = MockProvider::with_session(test_session("alice", "token-alice"));
    let profiles = Arc::new(HeldProfiles {
        inner: Arc::new(MemoryDb::new()),
        held_user: "bob".to_string(),
        release: Notify::new(),
    });
    let dyn_provider: Arc<dyn IdentityProvider> = provider.clone();
    let store = AuthStore::start(dyn_provider, profiles.clone(), CALLBACK);

    let state = store.wait_until_ready().await;
    assert_eq!(state.user_profile.map(|p| p.id).as_deref(), Some("alice"));

    provider.emit(AuthEvent::signed_in(test_session("bob", "token-bob")));
    wait_for_state(&store, |s| s.user.as_ref().map(|u| u.id.as_str()) == Some("bob")).await;

    // Bob's profile lookup is still pending
    let state = store.state();
    assert_eq!(
        state.session.as_ref().map(|s| s.access_token.as_str()),
        Some("token-bob")
    );
    assert!(state.user_profile.is_none());

    profiles.release.notify_one();
    wait_for_state(&store, |s| {
        s.user_profile.as_ref().map(|p| p.id.as_str()) == Some("bob")
    })
    .await;
}

#[tokio::test]
async fn test_refresh_user_profile() {
    let provider = MockProvider::new();
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    store.wait_until_ready().await;

    // Signed out: no-op
    assert_eq!(store.refresh_user_profile().await, None);
    assert_eq!(db.profile_reads(), 0);

    store
        .sign_in("ivy@example.com", GOOD_PASSWORD)
        .await
        .unwrap();

    // Points changed elsewhere (e.g. a report submitted)
    let mut profile: UserProfile = db.get_profile("ivy").await.unwrap();
    profile.points = 30;
    db.upsert_profile(&profile).await.unwrap();

    let refreshed = store.refresh_user_profile().await.unwrap();
    assert_eq!(refreshed.points, 30);
    assert_eq!(store.state().user_profile.map(|p| p.points), Some(30));
}

#[tokio::test]
async fn test_update_profile() {
    let provider = MockProvider::with_session(test_session("jack", "token-jack"));
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    store.wait_until_ready().await;

    let profile = store
        .update_profile(Some("Jack R.".to_string()), None)
        .await
        .unwrap();

    assert_eq!(profile.name.as_deref(), Some("Jack R."));
    assert_eq!(
        store.state().user_profile.and_then(|p| p.name),
        Some("Jack R.".to_string())
    );
}

#[tokio::test]
async fn test_update_profile_requires_sign_in() {
    let provider = MockProvider::new();
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    store.wait_until_ready().await;

    let err = store.update_profile(Some("x".to_string()), None).await;

    assert_eq!(err.unwrap_err(), AuthError::NotSignedIn);
}

#[tokio::test]
async fn test_shutdown_stops_listening() {
    let provider = MockProvider::new();
    let db = Arc::new(MemoryDb::new());
    let store = start(&provider, &db);
    store.wait_until_ready().await;

    store.shutdown();
    provider.emit(AuthEvent::signed_in(test_session("kim", "token-kim")));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.state().user.is_none());
    assert_eq!(provider.sign_in_calls.load(Ordering::SeqCst), 0);
}
