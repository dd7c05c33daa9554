// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Waste report model for storage and API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Fixed waste classification set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum WasteCategory {
    Biodegradable,
    Recyclable,
    Hazardous,
    #[serde(rename = "E-Waste")]
    EWaste,
}

impl WasteCategory {
    pub const ALL: [WasteCategory; 4] = [
        WasteCategory::Biodegradable,
        WasteCategory::Recyclable,
        WasteCategory::Hazardous,
        WasteCategory::EWaste,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WasteCategory::Biodegradable => "Biodegradable",
            WasteCategory::Recyclable => "Recyclable",
            WasteCategory::Hazardous => "Hazardous",
            WasteCategory::EWaste => "E-Waste",
        }
    }

    /// Hazardous reports are flagged urgent.
    pub fn is_urgent(&self) -> bool {
        *self == WasteCategory::Hazardous
    }
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WasteCategory {
    type Err = String;

    /// Case-insensitive; accepts the form values ("hazardous", "e-waste").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WasteCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown waste category: {}", s))
    }
}

/// Collection status. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum ReportStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Collected,
}

impl ReportStatus {
    /// Next status, or `None` once collected.
    pub fn advance(self) -> Option<ReportStatus> {
        match self {
            ReportStatus::Pending => Some(ReportStatus::InProgress),
            ReportStatus::InProgress => Some(ReportStatus::Collected),
            ReportStatus::Collected => None,
        }
    }
}

/// Report location: coordinates and/or a formatted address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReportLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
}

impl ReportLocation {
    /// Parse the form's location field.
    ///
    /// "37.42, -122.08" becomes coordinates (input kept as the address);
    /// anything else is treated as a plain address.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let coordinates = input.split_once(',').and_then(|(lat, lng)| {
            let lat: f64 = lat.trim().parse().ok()?;
            let lng: f64 = lng.trim().parse().ok()?;
            Some((lat, lng))
        });

        match coordinates {
            Some((lat, lng)) => Self {
                latitude: Some(lat),
                longitude: Some(lng),
                formatted_address: Some(input.to_string()),
                ..Self::default()
            },
            None => Self {
                formatted_address: Some(input.to_string()),
                ..Self::default()
            },
        }
    }
}

/// Stored report in the `waste_reports` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WasteReport {
    /// Report ID ("WR-" + 6 digits)
    pub id: String,
    /// Reporting user
    pub user_id: String,
    #[serde(rename = "type")]
    pub category: WasteCategory,
    pub status: ReportStatus,
    pub location: ReportLocation,
    pub description: String,
    /// When reported (ISO 8601)
    pub reported_at: String,
    /// When collected (ISO 8601)
    #[serde(default)]
    pub collected_at: Option<String>,
    /// Public URL of the uploaded photo
    #[serde(default)]
    pub image_url: Option<String>,
    pub urgent: bool,
}

/// Photo attached to a report draft.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// File extension from the name, "jpg" when there is none.
    pub fn extension(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .unwrap_or("jpg")
    }
}

/// Report form contents before submission.
#[derive(Debug, Clone, Validate)]
pub struct ReportDraft {
    #[validate(length(min = 1, message = "Location is required"))]
    pub location: String,
    #[validate(required(message = "Waste type is required"))]
    pub category: Option<WasteCategory>,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub image: Option<ImageUpload>,
}
