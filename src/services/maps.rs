// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Maps client: JavaScript API script and Geocoding.
//!
//! The script is fetched once per process through a [`ResourceLoader`] and
//! served to the frontend from there, so the API key stays server-side.
//! Geocoding degrades to readable fallbacks instead of failing.

use crate::models::Location;
use crate::services::loader::{ResourceFetcher, ResourceLoader};
use crate::services::retry::{retry, LoadError, RetryPolicy, TerminalPolicy};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_MAPS_BASE_URL: &str = "https://maps.googleapis.com";

/// Registry key for the Maps JavaScript API.
pub const MAP_SCRIPT_KEY: &str = "google-maps-js";

/// Callback the script invokes once loaded.
pub const MAP_SCRIPT_CALLBACK: &str = "initGoogleMapsCallback";

pub const UNKNOWN_LOCATION: &str = "Unknown location";

/// Fetches the Maps JavaScript API.
pub struct MapScriptFetcher {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl MapScriptFetcher {
    fn script_url(&self, api_key: &str) -> String {
        format!(
            "{}/maps/api/js?key={}&libraries=places&callback={}",
            self.base_url,
            urlencoding::encode(api_key),
            MAP_SCRIPT_CALLBACK
        )
    }
}

#[async_trait]
impl ResourceFetcher for MapScriptFetcher {
    type Output = Arc<String>;

    async fn fetch(&self, _key: &str) -> Result<Arc<String>, LoadError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LoadError::PermanentConfiguration("GOOGLE_MAPS_API_KEY not set".to_string())
        })?;

        let response = self
            .http
            .get(self.script_url(api_key))
            .send()
            .await
            .map_err(|e| LoadError::TransientNetwork(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LoadError::TransientNetwork(format!(
                "Maps script HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LoadError::TransientNetwork(e.to_string()))?;
        if body.trim().is_empty() {
            return Err(LoadError::MalformedResponse(
                "empty Maps script body".to_string(),
            ));
        }

        Ok(Arc::new(body))
    }
}

/// Geocoding API response.
#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// Maps script loader plus geocoding.
#[derive(Clone)]
pub struct MapsService {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    script: ResourceLoader<MapScriptFetcher>,
    geocode_policy: RetryPolicy,
}

impl MapsService {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_endpoint(DEFAULT_MAPS_BASE_URL, api_key)
    }

    /// Point at a different API host (tests, proxies).
    pub fn with_endpoint(base_url: &str, api_key: Option<String>) -> Self {
        Self::with_policies(
            base_url,
            api_key,
            RetryPolicy::map_script(),
            RetryPolicy::geocoding(),
        )
    }

    pub fn with_policies(
        base_url: &str,
        api_key: Option<String>,
        script_policy: RetryPolicy,
        geocode_policy: RetryPolicy,
    ) -> Self {
        let http = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();
        let fetcher = MapScriptFetcher {
            http: http.clone(),
            base_url: base_url.clone(),
            api_key: api_key.clone(),
        };
        Self {
            http,
            base_url,
            api_key,
            script: ResourceLoader::new(fetcher, script_policy),
            geocode_policy,
        }
    }

    /// Load the Maps JavaScript API, at most once concurrently.
    pub async fn load_script(&self) -> Result<Arc<String>, LoadError> {
        self.script.acquire(MAP_SCRIPT_KEY).await
    }

    pub fn is_script_loaded(&self) -> bool {
        self.script.is_loaded(MAP_SCRIPT_KEY)
    }

    /// Reverse geocode. Never fails: falls back to a coordinate label.
    pub async fn address_from_coordinates(&self, lat: f64, lng: f64) -> String {
        tracing::debug!(lat, lng, "Getting address for coordinates");
        let query = [("latlng", format!("{},{}", lat, lng))];

        match self.geocode(&query).await {
            Ok(data) if data.status == "OK" => match data.results.into_iter().next() {
                Some(result) => result.formatted_address,
                None => UNKNOWN_LOCATION.to_string(),
            },
            Ok(data) => {
                tracing::warn!(
                    status = %data.status,
                    error_message = data.error_message.as_deref().unwrap_or(""),
                    "Geocoding API returned non-OK status"
                );
                Location::coordinate_label(lat, lng)
            }
            Err(e) => {
                tracing::error!(error = %e, "Error getting address");
                Location::coordinate_label(lat, lng)
            }
        }
    }

    /// Forward geocode. `None` on any failure or no match.
    pub async fn coordinates_from_address(&self, address: &str) -> Option<Location> {
        tracing::debug!(address, "Getting coordinates for address");
        let query = [("address", address.to_string())];

        match self.geocode(&query).await {
            Ok(data) if data.status == "OK" => data.results.into_iter().next().map(|r| Location {
                lat: r.geometry.location.lat,
                lng: r.geometry.location.lng,
                address: Some(r.formatted_address),
            }),
            Ok(data) => {
                tracing::warn!(status = %data.status, "Geocoding API returned non-OK status");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Error getting coordinates");
                None
            }
        }
    }

    async fn geocode(&self, query: &[(&str, String)]) -> Result<GeocodeResponse, LoadError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LoadError::PermanentConfiguration("GOOGLE_MAPS_API_KEY not set".to_string())
        })?;
        let url = format!("{}/maps/api/geocode/json", self.base_url);
        let http = &self.http;
        let url = &url;

        retry(
            &self.geocode_policy,
            TerminalPolicy::Fail,
            "geocoding",
            |_| async move {
                let response = http
                    .get(url)
                    .query(query)
                    .query(&[("key", api_key)])
                    .send()
                    .await
                    .map_err(|e| LoadError::TransientNetwork(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(LoadError::TransientNetwork(format!(
                        "Geocoding API error: {}",
                        response.status()
                    )));
                }

                let data: GeocodeResponse = response
                    .json()
                    .await
                    .map_err(|e| LoadError::MalformedResponse(e.to_string()))?;

                // Google documents these two as worth retrying
                if matches!(data.status.as_str(), "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR") {
                    return Err(LoadError::TransientNetwork(format!(
                        "Geocoding API returned status: {}",
                        data.status
                    )));
                }

                Ok(data)
            },
        )
        .await
    }
}
