// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process data store for tests and offline runs.
//!
//! Enforces a uniqueness constraint on profile IDs, so concurrent default
//! profile creation can never produce two rows for one user.

use crate::db::{DbError, ObjectStorage, ProfileStore, ReportStore};
use crate::models::{ProfilePatch, ReportStatus, UserProfile, WasteReport};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory tables plus failure switches for exercising fallback paths.
#[derive(Default)]
pub struct MemoryDb {
    profiles: DashMap<String, UserProfile>,
    reports: DashMap<String, WasteReport>,
    objects: DashMap<String, Vec<u8>>,

    fail_profile_reads: AtomicBool,
    fail_upserts: AtomicBool,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_uploads: AtomicBool,

    profile_reads: AtomicUsize,
    upserts: AtomicUsize,
    inserts: AtomicUsize,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make profile reads fail with a non-"no rows" error.
    pub fn set_fail_profile_reads(&self, fail: bool) {
        self.fail_profile_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn profile_reads(&self) -> usize {
        self.profile_reads.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn report_count(&self) -> usize {
        self.reports.len()
    }

    /// Stored object bytes, keyed "bucket/path".
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.objects
            .get(&format!("{}/{}", bucket, path))
            .map(|o| o.clone())
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), DbError> {
        if flag.load(Ordering::SeqCst) {
            return Err(DbError::Request(format!("{} failed (injected)", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryDb {
    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, DbError> {
        self.profile_reads.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_profile_reads, "profile read")?;
        self.profiles
            .get(user_id)
            .map(|p| p.clone())
            .ok_or(DbError::NoRows)
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile, DbError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_upserts, "upsert")?;
        self.profiles.insert(profile.id.clone(), profile.clone());
        Ok(profile.clone())
    }

    async fn insert_profile(&self, profile: &UserProfile) -> Result<UserProfile, DbError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_inserts, "insert")?;
        match self.profiles.entry(profile.id.clone()) {
            Entry::Occupied(_) => Err(DbError::Conflict(format!(
                "user_profiles.id = {}",
                profile.id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(profile.clone());
                Ok(profile.clone())
            }
        }
    }

    async fn update_profile(
        &self,
        user_id: &str,
        patch: &ProfilePatch,
    ) -> Result<UserProfile, DbError> {
        Self::check(&self.fail_updates, "update")?;
        let mut profile = self.profiles.get_mut(user_id).ok_or(DbError::NoRows)?;
        profile.apply(patch);
        Ok(profile.clone())
    }

    async fn increment_stats(
        &self,
        user_id: &str,
        reports: u32,
        points: u32,
    ) -> Result<UserProfile, DbError> {
        Self::check(&self.fail_updates, "update")?;
        // Shard write lock held across read and write
        let mut profile = self.profiles.get_mut(user_id).ok_or(DbError::NoRows)?;
        let patch = ProfilePatch::stats_added(&profile, reports, points);
        profile.apply(&patch);
        Ok(profile.clone())
    }
}

#[async_trait]
impl ReportStore for MemoryDb {
    async fn insert_report(&self, report: &WasteReport) -> Result<(), DbError> {
        match self.reports.entry(report.id.clone()) {
            Entry::Occupied(_) => Err(DbError::Conflict(format!(
                "waste_reports.id = {}",
                report.id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(report.clone());
                Ok(())
            }
        }
    }

    async fn get_report(&self, report_id: &str) -> Result<WasteReport, DbError> {
        self.reports
            .get(report_id)
            .map(|r| r.clone())
            .ok_or(DbError::NoRows)
    }

    async fn list_reports_for_user(&self, user_id: &str) -> Result<Vec<WasteReport>, DbError> {
        let mut reports: Vec<WasteReport> = self
            .reports
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.clone())
            .collect();
        reports.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
        Ok(reports)
    }

    async fn update_report_status(
        &self,
        report_id: &str,
        status: ReportStatus,
        collected_at: Option<&str>,
    ) -> Result<WasteReport, DbError> {
        let mut report = self.reports.get_mut(report_id).ok_or(DbError::NoRows)?;
        report.status = status;
        if let Some(at) = collected_at {
            report.collected_at = Some(at.to_string());
        }
        Ok(report.clone())
    }
}

#[async_trait]
impl ObjectStorage for MemoryDb {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), DbError> {
        Self::check(&self.fail_uploads, "upload")?;
        self.objects.insert(format!("{}/{}", bucket, path), bytes);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{}/{}", bucket, path)
    }
}
