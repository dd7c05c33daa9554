// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Waste report submission, listing and status changes.

use crate::db::{buckets, DbError, ObjectStorage, ProfileStore, ReportStore};
use crate::error::AppError;
use crate::models::{
    ImageUpload, ReportDraft, ReportLocation, ReportStatus, WasteReport, POINTS_PER_REPORT,
};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use validator::Validate;

/// Inserts tried with a fresh ID when the previous one was already taken.
const MAX_ID_ATTEMPTS: usize = 3;

/// Report ID from a millisecond stamp: "WR-" plus its last six digits.
pub fn report_id(millis: i64) -> String {
    format!("WR-{:06}", millis.rem_euclid(1_000_000))
}

/// Storage path for a report photo.
pub fn image_path(report_id: &str, now: DateTime<Utc>, image: &ImageUpload) -> String {
    format!(
        "waste-reports/{}/{}.{}",
        report_id,
        now.timestamp_millis(),
        image.extension()
    )
}

#[derive(Clone)]
pub struct ReportService {
    reports: Arc<dyn ReportStore>,
    profiles: Arc<dyn ProfileStore>,
    storage: Arc<dyn ObjectStorage>,
    /// Last millisecond stamp handed out as a report ID.
    last_id_millis: Arc<AtomicI64>,
}

impl ReportService {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        profiles: Arc<dyn ProfileStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            reports,
            profiles,
            storage,
            last_id_millis: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Millisecond stamp for the next ID: the clock, bumped past the last
    /// stamp issued so submissions in the same millisecond get distinct IDs.
    fn next_id_millis(&self, now: DateTime<Utc>) -> i64 {
        let now = now.timestamp_millis();
        let previous = match self.last_id_millis.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |last| Some(now.max(last + 1)),
        ) {
            Ok(previous) | Err(previous) => previous,
        };
        now.max(previous + 1)
    }

    /// Submit a report for `user_id` (`None` when signed out).
    ///
    /// The profile stats update afterwards is best effort: its failure is
    /// logged and the submitted report is still returned.
    pub async fn submit(
        &self,
        user_id: Option<&str>,
        draft: ReportDraft,
    ) -> Result<WasteReport, AppError> {
        draft.validate()?;
        let user_id = user_id.ok_or(AppError::Unauthorized)?;
        let category = draft
            .category
            .ok_or_else(|| AppError::BadRequest("Waste type is required".to_string()))?;

        let now = Utc::now();
        let location = ReportLocation::parse(&draft.location);
        let mut attempt = 1;

        let report = loop {
            let id = report_id(self.next_id_millis(now));

            let image_url = match &draft.image {
                Some(image) => Some(self.upload_image(&id, now, image).await?),
                None => None,
            };

            let report = WasteReport {
                id,
                user_id: user_id.to_string(),
                category,
                status: ReportStatus::Pending,
                location: location.clone(),
                description: draft.description.clone(),
                reported_at: format_utc_rfc3339(now),
                collected_at: None,
                image_url,
                urgent: category.is_urgent(),
            };

            match self.reports.insert_report(&report).await {
                Ok(()) => break report,
                Err(DbError::Conflict(_)) if attempt < MAX_ID_ATTEMPTS => {
                    tracing::warn!(report_id = %report.id, attempt, "Report ID taken, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        tracing::info!(
            report_id = %report.id,
            user_id,
            category = %report.category,
            urgent = report.urgent,
            "Report submitted"
        );

        if let Err(e) = self
            .profiles
            .increment_stats(user_id, 1, POINTS_PER_REPORT)
            .await
        {
            tracing::error!(user_id, error = %e, "Error updating user stats");
        }

        Ok(report)
    }

    async fn upload_image(
        &self,
        report_id: &str,
        now: DateTime<Utc>,
        image: &ImageUpload,
    ) -> Result<String, AppError> {
        let path = image_path(report_id, now, image);
        self.storage
            .upload(
                buckets::WASTE_IMAGES,
                &path,
                &image.content_type,
                image.bytes.clone(),
            )
            .await
            .map_err(|e| {
                tracing::error!(report_id, error = %e, "Image upload error");
                AppError::Storage(format!("Image upload failed: {}", e))
            })?;
        Ok(self.storage.public_url(buckets::WASTE_IMAGES, &path))
    }


    /// A user's reports, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<WasteReport>, AppError> {
        Ok(self.reports.list_reports_for_user(user_id).await?)
    }

    /// Move a report one step forward. Collecting stamps `collected_at`.
    pub async fn advance_status(
        &self,
        user_id: &str,
        report_id: &str,
    ) -> Result<WasteReport, AppError> {
        let report = match self.reports.get_report(report_id).await {
            Ok(report) if report.user_id == user_id => report,
            Ok(_) => return Err(AppError::NotFound(format!("report {}", report_id))),
            Err(e) if e.is_no_rows() => {
                return Err(AppError::NotFound(format!("report {}", report_id)))
            }
            Err(e) => return Err(e.into()),
        };

        let next = report.status.advance().ok_or_else(|| {
            AppError::BadRequest(format!("Report {} is already collected", report_id))
        })?;
        let collected_at =
            (next == ReportStatus::Collected).then(|| format_utc_rfc3339(Utc::now()));

        let updated = self
            .reports
            .update_report_status(report_id, next, collected_at.as_deref())
            .await?;
        tracing::info!(report_id, status = ?next, "Report status advanced");
        Ok(updated)
    }
}
