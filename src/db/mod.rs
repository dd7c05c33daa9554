//! Database layer (Supabase tables and storage).
//!
//! The traits here are the narrow data interfaces the rest of the crate
//! depends on. [`SupabaseDb`] talks to PostgREST and Storage over HTTP;
//! [`MemoryDb`] keeps everything in process for tests and offline runs.

pub mod memory;
pub mod supabase;

pub use memory::MemoryDb;
pub use supabase::SupabaseDb;

use crate::models::{ProfilePatch, ReportStatus, UserProfile, WasteReport};
use async_trait::async_trait;

/// Table names as constants.
pub mod tables {
    pub const USER_PROFILES: &str = "user_profiles";
    pub const WASTE_REPORTS: &str = "waste_reports";
}

/// Storage bucket names.
pub mod buckets {
    pub const WASTE_IMAGES: &str = "waste-images";
}

/// PostgREST error code for "`.single()` matched no rows".
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Data store errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DbError {
    #[error("no rows returned")]
    NoRows,

    #[error("duplicate key: {0}")]
    Conflict(String),

    #[error("{code}: {message}")]
    Api { code: String, message: String },

    #[error("request failed: {0}")]
    Request(String),
}

impl DbError {
    /// The distinguished "row not found" case.
    pub fn is_no_rows(&self) -> bool {
        match self {
            DbError::NoRows => true,
            DbError::Api { code, .. } => code == NO_ROWS_CODE,
            _ => false,
        }
    }
}

/// `user_profiles` table.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch exactly one profile; [`DbError::NoRows`] when missing.
    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, DbError>;

    /// Insert or replace by ID.
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile, DbError>;

    /// Plain insert; fails with [`DbError::Conflict`] when the ID exists.
    async fn insert_profile(&self, profile: &UserProfile) -> Result<UserProfile, DbError>;

    /// Apply a partial update to an existing profile.
    async fn update_profile(
        &self,
        user_id: &str,
        patch: &ProfilePatch,
    ) -> Result<UserProfile, DbError>;

    /// Add to the profile's report and point counters without losing
    /// concurrent increments.
    async fn increment_stats(
        &self,
        user_id: &str,
        reports: u32,
        points: u32,
    ) -> Result<UserProfile, DbError>;
}

/// `waste_reports` table.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert_report(&self, report: &WasteReport) -> Result<(), DbError>;

    async fn get_report(&self, report_id: &str) -> Result<WasteReport, DbError>;

    /// Reports by one user, newest first.
    async fn list_reports_for_user(&self, user_id: &str) -> Result<Vec<WasteReport>, DbError>;

    async fn update_report_status(
        &self,
        report_id: &str,
        status: ReportStatus,
        collected_at: Option<&str>,
    ) -> Result<WasteReport, DbError>;
}

/// Object storage for report photos.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), DbError>;

    /// Public URL for an uploaded object (no I/O).
    fn public_url(&self, bucket: &str, path: &str) -> String;
}
