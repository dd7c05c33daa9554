// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod location;
pub mod profile;
pub mod report;
pub mod session;

pub use location::Location;
pub use profile::{ProfilePatch, UserProfile, POINTS_PER_REPORT};
pub use report::{ImageUpload, ReportDraft, ReportLocation, ReportStatus, WasteCategory, WasteReport};
pub use session::{AuthUser, Session};
