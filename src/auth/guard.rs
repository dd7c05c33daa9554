// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! App routes and the protected-route gate.

use crate::auth::store::{AuthPhase, AuthState};

/// Pages of the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Root,
    Login,
    Report,
    Dashboard,
    Leaderboard,
    Profile,
    Contact,
    AuthCallback,
}

impl Route {
    pub const LOGIN_PATH: &'static str = "/login";

    /// Match a path; unknown paths are `None` (redirect to root).
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or("");
        let path = match path.trim_end_matches('/') {
            "" => "/",
            p => p,
        };
        Some(match path {
            "/" => Route::Root,
            "/login" => Route::Login,
            "/report" => Route::Report,
            "/dashboard" => Route::Dashboard,
            "/leaderboard" => Route::Leaderboard,
            "/profile" => Route::Profile,
            "/contact" => Route::Contact,
            "/auth/callback" => Route::AuthCallback,
            _ => return None,
        })
    }

    /// Only these require a signed-in user.
    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            Route::Report | Route::Dashboard | Route::Leaderboard | Route::Profile
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// Store still initializing (bounded by the init timeout).
    ShowSpinner,
    Redirect(&'static str),
}

/// Decide what to show for `path` given the current auth state.
pub fn guard(path: &str, state: &AuthState) -> GuardDecision {
    let Some(route) = Route::from_path(path) else {
        return GuardDecision::Redirect("/");
    };
    if !route.is_protected() {
        return GuardDecision::Render;
    }
    if state.loading && state.phase != AuthPhase::Ready {
        return GuardDecision::ShowSpinner;
    }
    if state.is_authenticated() {
        GuardDecision::Render
    } else {
        GuardDecision::Redirect(Route::LOGIN_PATH)
    }
}
