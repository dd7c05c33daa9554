// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Waste image classification via the Gemini `generateContent` API.
//!
//! The model answers in free text; the category comes from keyword matching.
//! Classification never fails outright: after retries (or with no API key)
//! a deterministic fallback category is returned, marked as such.

use crate::models::WasteCategory;
use crate::services::retry::{retry, LoadError, RetryPolicy, TerminalPolicy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro-vision:generateContent";

const PROMPT: &str = "Analyze this image and classify the waste shown into one of these categories: \
Biodegradable, Recyclable, Hazardous, or E-Waste. Describe what you see in the image and explain \
why it belongs to that category.";

const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// Keyword sets, checked in order. First match wins.
const KEYWORDS: [(WasteCategory, &[&str]); 4] = [
    (
        WasteCategory::Biodegradable,
        &["biodegradable", "food", "organic", "compost", "plant", "vegetable", "fruit"],
    ),
    (
        WasteCategory::Recyclable,
        &["recyclable", "plastic", "paper", "cardboard", "glass", "metal", "aluminum", "tin", "steel"],
    ),
    (
        WasteCategory::Hazardous,
        &["hazardous", "toxic", "chemical", "paint", "oil", "battery", "pesticide", "solvent"],
    ),
    (
        WasteCategory::EWaste,
        &["e-waste", "electronic", "computer", "phone", "device", "appliance", "circuit"],
    ),
];

/// Where a category came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// Matched in the model's description.
    Model,
    /// Made up because the model was unavailable or inconclusive.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: WasteCategory,
    pub source: ClassificationSource,
    /// Model description, when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Classification {
    fn fallback(payload: &str, description: Option<String>) -> Self {
        Self {
            category: fallback_category(payload),
            source: ClassificationSource::Fallback,
            description,
        }
    }
}

/// Category named by keywords in `text`, if any.
pub fn determine_waste_type(text: &str) -> Option<WasteCategory> {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(category, _)| *category)
}

/// Deterministic stand-in category for a payload.
pub fn fallback_category(payload: &str) -> WasteCategory {
    let digest = Sha256::digest(payload.as_bytes());
    WasteCategory::ALL[digest[0] as usize % WasteCategory::ALL.len()]
}

/// Split an optional data URL into (mime type, base64 data).
fn split_data_url(image: &str) -> (&str, &str) {
    match image.split_once("base64,") {
        Some((prefix, data)) => {
            let mime = prefix
                .strip_prefix("data:")
                .map(|p| p.trim_end_matches(';'))
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_MIME_TYPE);
            (mime, data)
        }
        None => (DEFAULT_MIME_TYPE, image),
    }
}

// --- Gemini wire types ---

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_k: 32,
            top_p: 1.0,
            max_output_tokens: 4096,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

/// Gemini classification client.
#[derive(Clone)]
pub struct ClassifierClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    policy: RetryPolicy,
}

impl ClassifierClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            api_key,
            policy: RetryPolicy::classification(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Classify a base64 image (a `data:` URL prefix is accepted).
    pub async fn classify(&self, image_base64: &str) -> Classification {
        let (mime_type, data) = split_data_url(image_base64);
        tracing::info!(mime_type, bytes = data.len(), "Classifying waste image");

        let classified = retry(
            &self.policy,
            TerminalPolicy::Fallback(Classification::fallback(data, None)),
            "classification",
            |_| async move {
                let text = self.generate(mime_type, data).await?;
                Ok(match determine_waste_type(&text) {
                    Some(category) => Classification {
                        category,
                        source: ClassificationSource::Model,
                        description: Some(text),
                    },
                    None => {
                        tracing::warn!("No category keyword in model response, using fallback");
                        Classification::fallback(data, Some(text))
                    }
                })
            },
        )
        .await
        .unwrap_or_else(|_| Classification::fallback(data, None));

        tracing::info!(
            category = %classified.category,
            source = ?classified.source,
            "Classified waste image"
        );
        classified
    }

    /// Classify raw image bytes.
    pub async fn classify_bytes(&self, bytes: &[u8], mime_type: &str) -> Classification {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.classify(&format!("data:{};base64,{}", mime_type, encoded))
            .await
    }

    /// One request; returns the model's description text.
    async fn generate(&self, mime_type: &str, data: &str) -> Result<String, LoadError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LoadError::PermanentConfiguration("GEMINI_API_KEY not set".to_string())
        })?;

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: PROMPT },
                    Part::Image {
                        inline_data: InlineData { mime_type, data },
                    },
                ],
            }],
            generation_config: GenerationConfig::default(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| LoadError::TransientNetwork(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LoadError::TransientNetwork(format!(
                "Gemini API error: {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LoadError::MalformedResponse(e.to_string()))?;

        body.first_text()
            .map(|t| t.trim().to_string())
            .ok_or_else(|| {
                LoadError::MalformedResponse("Unexpected Gemini API response structure".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_order() {
        assert_eq!(
            determine_waste_type("A pile of FOOD scraps in a plastic bag"),
            Some(WasteCategory::Biodegradable)
        );
        assert_eq!(
            determine_waste_type("Crushed aluminum cans"),
            Some(WasteCategory::Recyclable)
        );
        assert_eq!(
            determine_waste_type("An old phone battery"),
            Some(WasteCategory::Hazardous)
        );
        assert_eq!(
            determine_waste_type("A broken computer monitor"),
            Some(WasteCategory::EWaste)
        );
        assert_eq!(determine_waste_type("Something unclear"), None);
    }

    #[test]
    fn test_fallback_is_deterministic() {
        assert_eq!(fallback_category("abc"), fallback_category("abc"));
    }

    #[test]
    fn test_split_data_url() {
        assert_eq!(
            split_data_url("data:image/png;base64,AAAA"),
            ("image/png", "AAAA")
        );
        assert_eq!(split_data_url("AAAA"), ("image/jpeg", "AAAA"));
        assert_eq!(split_data_url("base64,BBBB"), ("image/jpeg", "BBBB"));
    }

    #[test]
    fn test_request_wire_format() {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: "hi" },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: "AAAA",
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig::default(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [{"parts": [
                    {"text": "hi"},
                    {"inline_data": {"mime_type": "image/jpeg", "data": "AAAA"}}
                ]}],
                "generationConfig": {
                    "temperature": 0.2,
                    "topK": 32,
                    "topP": 1.0,
                    "maxOutputTokens": 4096
                }
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_key_falls_back_immediately() {
        let client = ClassifierClient::new(None).with_endpoint("http://127.0.0.1:9/unused");
        let started = tokio::time::Instant::now();

        let result = client.classify("data:image/jpeg;base64,AAAA").await;

        assert_eq!(result.source, ClassificationSource::Fallback);
        assert_eq!(result.category, fallback_category("AAAA"));
        assert_eq!(started.elapsed(), std::time::Duration::ZERO);
    }
}
