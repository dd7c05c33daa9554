// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public routes backed by Google APIs. Keys never leave the server.

use crate::error::{AppError, Result};
use crate::models::Location;
use crate::services::{Classification, LoadError};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/geocode/reverse", get(reverse_geocode))
        .route("/api/geocode", get(forward_geocode))
        .route("/api/classify", post(classify))
        .route("/api/maps/script", get(map_script))
}

// ─── Geocoding ───────────────────────────────────────────────

#[derive(Deserialize)]
struct ReverseQuery {
    lat: f64,
    lng: f64,
}

#[derive(Serialize)]
pub struct AddressResponse {
    pub address: String,
}

async fn reverse_geocode(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReverseQuery>,
) -> Result<Json<AddressResponse>> {
    if !(-90.0..=90.0).contains(&query.lat) || !(-180.0..=180.0).contains(&query.lng) {
        return Err(AppError::BadRequest("Coordinates out of range".to_string()));
    }
    let address = state
        .maps
        .address_from_coordinates(query.lat, query.lng)
        .await;
    Ok(Json(AddressResponse { address }))
}

#[derive(Deserialize)]
struct ForwardQuery {
    address: String,
}

#[derive(Serialize)]
pub struct LocationResponse {
    pub location: Option<Location>,
}

async fn forward_geocode(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ForwardQuery>,
) -> Result<Json<LocationResponse>> {
    let address = query.address.trim();
    if address.is_empty() {
        return Err(AppError::BadRequest("address is required".to_string()));
    }
    let location = state.maps.coordinates_from_address(address).await;
    Ok(Json(LocationResponse { location }))
}

// ─── Classification ──────────────────────────────────────────

#[derive(Deserialize)]
struct ClassifyRequest {
    /// Base64 image, optionally as a `data:` URL
    image: String,
}

async fn classify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClassifyRequest>,
) -> Result<Json<Classification>> {
    if body.image.trim().is_empty() {
        return Err(AppError::BadRequest("image is required".to_string()));
    }
    Ok(Json(state.classifier.classify(&body.image).await))
}

// ─── Map Script ──────────────────────────────────────────────

/// Maps JavaScript API, loaded once per process and served from memory.
async fn map_script(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let script = state.maps.load_script().await.map_err(|e| match e {
        LoadError::PermanentConfiguration(msg) => AppError::NotFound(msg),
        other => AppError::Upstream(format!("Failed to load Google Maps API: {}", other)),
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        script.as_str().to_owned(),
    ))
}
