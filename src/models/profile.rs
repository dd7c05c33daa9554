// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gamification profile, one per authenticated user.

use crate::models::AuthUser;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Points awarded per submitted report.
pub const POINTS_PER_REPORT: u32 = 10;

/// Points needed for level 2.
pub const FIRST_LEVEL_POINTS: u32 = 200;

/// User profile stored in the `user_profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserProfile {
    /// Auth user ID (also the row key)
    pub id: String,
    /// Display name
    pub name: Option<String>,
    /// Avatar image URL
    pub avatar_url: Option<String>,
    pub points: u32,
    /// Number of reports submitted
    pub reports: u32,
    /// Recycling percentage (0-100)
    pub recycling: u8,
    pub level: u32,
    /// Points required to reach the next level
    pub next_level_points: u32,
    /// Leaderboard rank
    pub rank: u32,
}

impl UserProfile {
    /// Default profile created on the first sign-in of `user`.
    pub fn default_for(user: &AuthUser) -> Self {
        Self {
            id: user.id.clone(),
            name: Some(user.default_display_name()),
            avatar_url: Some(placeholder_avatar_url(&user.id)),
            points: 0,
            reports: 0,
            recycling: 0,
            level: 1,
            next_level_points: FIRST_LEVEL_POINTS,
            rank: 1,
        }
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        if let Some(name) = &patch.name {
            self.name = Some(name.clone());
        }
        if let Some(avatar_url) = &patch.avatar_url {
            self.avatar_url = Some(avatar_url.clone());
        }
        if let Some(points) = patch.points {
            self.points = points;
        }
        if let Some(reports) = patch.reports {
            self.reports = reports;
        }
    }
}

/// Deterministic placeholder avatar keyed by user ID.
pub fn placeholder_avatar_url(user_id: &str) -> String {
    format!(
        "https://api.dicebear.com/7.x/avataaars/svg?seed={}",
        urlencoding::encode(user_id)
    )
}

/// Partial profile update. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports: Option<u32>,
}

impl ProfilePatch {
    /// Stats of `current` with `reports` and `points` added.
    pub fn stats_added(current: &UserProfile, reports: u32, points: u32) -> Self {
        Self {
            reports: Some(current.reports.saturating_add(reports)),
            points: Some(current.points.saturating_add(points)),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
