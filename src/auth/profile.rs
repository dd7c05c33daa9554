// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile resolution for a signed-in user.

use crate::db::{DbError, ProfileStore};
use crate::models::{AuthUser, UserProfile};

/// Find the user's profile, creating the default one on first sign-in.
///
/// Missing rows are created through upsert, falling back once to a plain
/// insert. Any failure is logged and yields `None`; callers keep working
/// without a profile.
pub async fn resolve_profile(store: &dyn ProfileStore, user: &AuthUser) -> Option<UserProfile> {
    match store.get_profile(&user.id).await {
        Ok(profile) => return Some(profile),
        Err(e) if e.is_no_rows() => {
            tracing::info!(user_id = %user.id, "No profile found, creating default profile");
        }
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Error fetching user profile");
            return None;
        }
    }

    let profile = UserProfile::default_for(user);

    match store.upsert_profile(&profile).await {
        Ok(created) => {
            tracing::info!(user_id = %user.id, "Created profile");
            return Some(created);
        }
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Profile upsert failed, trying insert");
        }
    }

    match store.insert_profile(&profile).await {
        Ok(created) => {
            tracing::info!(user_id = %user.id, "Created profile via insert");
            Some(created)
        }
        Err(DbError::Conflict(_)) => {
            // Someone else created it in the meantime
            store.get_profile(&user.id).await.ok()
        }
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to create user profile");
            None
        }
    }
}
