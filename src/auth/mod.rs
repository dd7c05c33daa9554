// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication: identity provider, session store and profile resolution.

pub mod guard;
pub mod profile;
pub mod provider;
pub mod store;
pub mod supabase;

pub use guard::{guard, GuardDecision, Route};
pub use profile::resolve_profile;
pub use provider::{
    AuthError, AuthEvent, AuthEventKind, IdentityProvider, OAuthProvider, SignUpData,
    Subscription,
};
pub use store::{AuthPhase, AuthState, AuthStore, Notice, NoticeKind, UiEvent};
pub use supabase::{SessionCell, SupabaseAuth};
