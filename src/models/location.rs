//! Geographic point with an optional formatted address.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    /// Coordinates rendered as a fallback address.
    pub fn coordinate_label(lat: f64, lng: f64) -> String {
        format!("Lat: {:.6}, Lng: {:.6}", lat, lng)
    }
}
