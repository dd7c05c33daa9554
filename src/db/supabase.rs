// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase PostgREST and Storage client.
//!
//! Table access goes through `/rest/v1`, photo uploads through
//! `/storage/v1/object`. Requests carry the project API key plus a bearer
//! token: the service role key on the server, or the signed-in user's
//! access token when the session is shared with [`SupabaseAuth`].
//!
//! [`SupabaseAuth`]: crate::auth::SupabaseAuth

use crate::auth::SessionCell;
use crate::db::{tables, DbError, ObjectStorage, ProfileStore, ReportStore, NO_ROWS_CODE};
use crate::models::{ProfilePatch, ReportStatus, UserProfile, WasteReport};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Accept header that makes PostgREST return exactly one object.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Postgres unique violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Compare-and-set rounds for a stats increment before giving up.
const STATS_UPDATE_ATTEMPTS: usize = 5;

/// Which bearer token a request carries.
#[derive(Clone)]
enum Bearer {
    /// The project anon key.
    Anon,
    /// A fixed token, usually the service role key.
    Fixed(String),
    /// Whatever session the auth client currently holds.
    Session(SessionCell),
}

/// HTTP-backed Supabase tables and storage.
#[derive(Clone)]
pub struct SupabaseDb {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    bearer: Bearer,
}

/// PostgREST error body.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl SupabaseDb {
    /// Client authorized with the anon key only (subject to row level security).
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bearer: Bearer::Anon,
        }
    }

    /// Authorize every request with a fixed token (e.g. the service role key).
    pub fn with_bearer_token(mut self, token: &str) -> Self {
        self.bearer = Bearer::Fixed(token.to_string());
        self
    }

    /// Authorize requests with the session held by the auth client.
    pub fn with_session(mut self, session: SessionCell) -> Self {
        self.bearer = Bearer::Session(session);
        self
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn bearer_token(&self) -> String {
        match &self.bearer {
            Bearer::Anon => self.api_key.clone(),
            Bearer::Fixed(token) => token.clone(),
            Bearer::Session(cell) => cell
                .read()
                .await
                .as_ref()
                .map(|s| s.access_token.clone())
                .unwrap_or_else(|| self.api_key.clone()),
        }
    }

    async fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let token = self.bearer_token().await;
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, DbError> {
        let response = builder
            .send()
            .await
            .map_err(|e| DbError::Request(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, DbError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| DbError::Request(format!("Failed to parse response: {}", e)))
    }

    async fn get_single<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<T, DbError> {
        let builder = self
            .request(reqwest::Method::GET, &self.rest_url(table))
            .await
            .header("Accept", SINGLE_OBJECT)
            .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())]);
        self.send_json(builder).await
    }

    async fn patch_single<T: DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        table: &str,
        id: &str,
        body: &B,
    ) -> Result<T, DbError> {
        let builder = self
            .request(reqwest::Method::PATCH, &self.rest_url(table))
            .await
            .header("Accept", SINGLE_OBJECT)
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{}", id))])
            .json(body);
        self.send_json(builder).await
    }
}

/// Map an error response to a [`DbError`].
fn classify_error(status: reqwest::StatusCode, body: &str) -> DbError {
    let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|e| e.code.clone());
    let message = parsed
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match code.as_deref() {
        Some(NO_ROWS_CODE) => DbError::NoRows,
        Some(UNIQUE_VIOLATION) => DbError::Conflict(message),
        Some(code) => DbError::Api {
            code: code.to_string(),
            message,
        },
        None if status == reqwest::StatusCode::CONFLICT => DbError::Conflict(message),
        None => DbError::Api {
            code: status.as_u16().to_string(),
            message,
        },
    }
}

#[async_trait]
impl ProfileStore for SupabaseDb {
    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, DbError> {
        self.get_single(tables::USER_PROFILES, user_id).await
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile, DbError> {
        let builder = self
            .request(reqwest::Method::POST, &self.rest_url(tables::USER_PROFILES))
            .await
            .header("Accept", SINGLE_OBJECT)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .query(&[("on_conflict", "id")])
            .json(profile);
        self.send_json(builder).await
    }

    async fn insert_profile(&self, profile: &UserProfile) -> Result<UserProfile, DbError> {
        let builder = self
            .request(reqwest::Method::POST, &self.rest_url(tables::USER_PROFILES))
            .await
            .header("Accept", SINGLE_OBJECT)
            .header("Prefer", "return=representation")
            .json(profile);
        self.send_json(builder).await
    }

    async fn update_profile(
        &self,
        user_id: &str,
        patch: &ProfilePatch,
    ) -> Result<UserProfile, DbError> {
        self.patch_single(tables::USER_PROFILES, user_id, patch)
            .await
    }

    /// Optimistic update: the PATCH only matches while the counters still
    /// hold the values just read, otherwise it re-reads and tries again.
    async fn increment_stats(
        &self,
        user_id: &str,
        reports: u32,
        points: u32,
    ) -> Result<UserProfile, DbError> {
        for attempt in 0..STATS_UPDATE_ATTEMPTS {
            let current = self.get_profile(user_id).await?;
            let patch = ProfilePatch::stats_added(&current, reports, points);

            let builder = self
                .request(reqwest::Method::PATCH, &self.rest_url(tables::USER_PROFILES))
                .await
                .header("Prefer", "return=representation")
                .query(&[
                    ("id", format!("eq.{}", user_id)),
                    ("reports", format!("eq.{}", current.reports)),
                    ("points", format!("eq.{}", current.points)),
                ])
                .json(&patch);
            let updated: Vec<UserProfile> = self.send_json(builder).await?;

            if let Some(profile) = updated.into_iter().next() {
                return Ok(profile);
            }
            tracing::debug!(user_id, attempt, "Profile stats changed concurrently, retrying");
        }

        Err(DbError::Conflict(format!(
            "user_profiles.id = {}: stats kept changing",
            user_id
        )))
    }
}

#[async_trait]
impl ReportStore for SupabaseDb {
    async fn insert_report(&self, report: &WasteReport) -> Result<(), DbError> {
        let builder = self
            .request(reqwest::Method::POST, &self.rest_url(tables::WASTE_REPORTS))
            .await
            .header("Prefer", "return=minimal")
            .json(report);
        self.send(builder).await?;
        Ok(())
    }

    async fn get_report(&self, report_id: &str) -> Result<WasteReport, DbError> {
        self.get_single(tables::WASTE_REPORTS, report_id).await
    }

    async fn list_reports_for_user(&self, user_id: &str) -> Result<Vec<WasteReport>, DbError> {
        let builder = self
            .request(reqwest::Method::GET, &self.rest_url(tables::WASTE_REPORTS))
            .await
            .query(&[
                ("user_id", format!("eq.{}", user_id)),
                ("select", "*".to_string()),
                ("order", "reported_at.desc".to_string()),
            ]);
        self.send_json(builder).await
    }

    async fn update_report_status(
        &self,
        report_id: &str,
        status: ReportStatus,
        collected_at: Option<&str>,
    ) -> Result<WasteReport, DbError> {
        let mut body = serde_json::json!({ "status": status });
        if let Some(at) = collected_at {
            body["collected_at"] = serde_json::Value::String(at.to_string());
        }
        self.patch_single(tables::WASTE_REPORTS, report_id, &body)
            .await
    }
}

#[async_trait]
impl ObjectStorage for SupabaseDb {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), DbError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path);
        let builder = self
            .request(reqwest::Method::POST, &url)
            .await
            .header("Content-Type", content_type)
            .header("Cache-Control", "3600")
            .header("x-upsert", "false")
            .body(bytes);
        self.send(builder).await?;
        tracing::debug!(bucket, path, "Uploaded object");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, bucket, path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_no_rows() {
        let body = r#"{"code":"PGRST116","details":"The result contains 0 rows","message":"JSON object requested, multiple (or no) rows returned"}"#;
        let err = classify_error(reqwest::StatusCode::NOT_ACCEPTABLE, body);
        assert_eq!(err, DbError::NoRows);
        assert!(err.is_no_rows());
    }

    #[test]
    fn test_classify_unique_violation() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint \"user_profiles_pkey\""}"#;
        let err = classify_error(reqwest::StatusCode::CONFLICT, body);
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn test_classify_unstructured_body() {
        let err = classify_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(
            err,
            DbError::Api {
                code: "502".to_string(),
                message: "upstream down".to_string()
            }
        );
        assert!(!err.is_no_rows());
    }

    #[test]
    fn test_public_url() {
        let db = SupabaseDb::new("https://abc.supabase.co/", "anon");
        assert_eq!(
            db.public_url("waste-images", "waste-reports/WR-1/2.png"),
            "https://abc.supabase.co/storage/v1/object/public/waste-images/waste-reports/WR-1/2.png"
        );
    }
}
