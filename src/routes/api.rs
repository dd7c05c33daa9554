// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::auth::resolve_profile;
use crate::error::{AppError, Result};
use crate::middleware::auth::RequestUser;
use crate::models::{AuthUser, ImageUpload, ProfilePatch, ReportDraft, UserProfile, WasteReport};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// API routes (require authentication via Supabase access token).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/profile", get(get_profile).patch(update_profile))
        .route("/api/reports", get(list_reports).post(submit_report))
        .route("/api/reports/{id}/advance", post(advance_report))
}

// ─── User Profile ────────────────────────────────────────────

/// Get the caller's profile, creating the default one on first use.
async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<RequestUser>,
) -> Result<Json<UserProfile>> {
    let auth_user = AuthUser {
        id: user.user_id.clone(),
        email: user.email.clone(),
        user_metadata: serde_json::Value::Null,
    };

    resolve_profile(state.profiles.as_ref(), &auth_user)
        .await
        .map(Json)
        .ok_or_else(|| AppError::Database("Profile could not be loaded".to_string()))
}

/// Profile edit request.
#[derive(Debug, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 80, message = "Name must be 1-80 characters"))]
    pub name: Option<String>,
    #[validate(url(message = "Avatar must be a URL"))]
    pub avatar_url: Option<String>,
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<RequestUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>> {
    body.validate()?;

    let patch = ProfilePatch {
        name: body.name.map(|n| n.trim().to_string()),
        avatar_url: body.avatar_url,
        ..ProfilePatch::default()
    };
    if patch.is_empty() {
        return Err(AppError::BadRequest("Nothing to update".to_string()));
    }

    match state.profiles.update_profile(&user.user_id, &patch).await {
        Ok(profile) => {
            tracing::info!(user_id = %user.user_id, "Profile updated");
            Ok(Json(profile))
        }
        Err(e) if e.is_no_rows() => Err(AppError::NotFound("Profile not found".to_string())),
        Err(e) => Err(e.into()),
    }
}

// ─── Reports ─────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReportsResponse {
    pub reports: Vec<WasteReport>,
}

async fn list_reports(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<RequestUser>,
) -> Result<Json<ReportsResponse>> {
    let reports = state.reports.list_for_user(&user.user_id).await?;
    Ok(Json(ReportsResponse { reports }))
}

/// Photo attached to a report, base64-encoded.
#[derive(Debug, Deserialize)]
pub struct ImagePayload {
    pub file_name: String,
    pub content_type: String,
    /// Base64 bytes; a `data:` URL prefix is accepted
    pub data: String,
}

/// Report form submission.
#[derive(Debug, Deserialize)]
pub struct SubmitReportRequest {
    #[serde(default)]
    pub location: String,
    /// Category name, case-insensitive ("hazardous", "E-Waste", ...)
    #[serde(default)]
    pub waste_type: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<ImagePayload>,
}

impl SubmitReportRequest {
    fn into_draft(self) -> Result<ReportDraft> {
        let category = self
            .waste_type
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.parse().map_err(AppError::BadRequest))
            .transpose()?;

        let image = self
            .image
            .map(|image| {
                let data = image
                    .data
                    .split_once("base64,")
                    .map_or(image.data.as_str(), |(_, data)| data);
                let bytes = STANDARD
                    .decode(data.trim())
                    .map_err(|_| AppError::BadRequest("Invalid image data".to_string()))?;
                Ok::<_, AppError>(ImageUpload {
                    file_name: image.file_name,
                    content_type: image.content_type,
                    bytes,
                })
            })
            .transpose()?;

        Ok(ReportDraft {
            location: self.location.trim().to_string(),
            category,
            description: self.description.trim().to_string(),
            image,
        })
    }
}

async fn submit_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<RequestUser>,
    Json(body): Json<SubmitReportRequest>,
) -> Result<(StatusCode, Json<WasteReport>)> {
    let draft = body.into_draft()?;
    let report = state.reports.submit(Some(&user.user_id), draft).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn advance_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<RequestUser>,
    Path(report_id): Path<String>,
) -> Result<Json<WasteReport>> {
    let report = state
        .reports
        .advance_status(&user.user_id, &report_id)
        .await?;
    Ok(Json(report))
}
