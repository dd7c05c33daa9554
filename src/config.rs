//! Application configuration loaded from environment variables.
//!
//! A `.env` file is honored for local development. Supabase credentials fall
//! back to placeholders so the app can start without a project, with a
//! warning logged.

use std::env;

/// Placeholder Supabase project URL used when `SUPABASE_URL` is unset.
pub const PLACEHOLDER_SUPABASE_URL: &str = "https://your-project-id.supabase.co";
/// Placeholder anon key used when `SUPABASE_ANON_KEY` is unset.
pub const PLACEHOLDER_ANON_KEY: &str = "your-anon-key";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Supabase project URL
    pub supabase_url: String,
    /// Supabase anon (public) API key
    pub supabase_anon_key: String,
    /// Public site URL, used for auth redirects
    pub site_url: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// Service role key for server-side table access (bypasses RLS)
    pub supabase_service_key: Option<String>,
    /// Secret used by Supabase to sign access tokens (HS256)
    pub supabase_jwt_secret: Vec<u8>,
    /// Google Maps JavaScript + Geocoding API key
    pub google_maps_api_key: Option<String>,
    /// Gemini API key for image classification
    pub gemini_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|_| PLACEHOLDER_SUPABASE_URL.to_string()),
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|_| PLACEHOLDER_ANON_KEY.to_string()),
            site_url: env::var("SITE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            supabase_service_key: optional_secret("SUPABASE_SERVICE_ROLE_KEY"),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("SUPABASE_JWT_SECRET"))?
                .trim()
                .as_bytes()
                .to_vec(),
            google_maps_api_key: optional_secret("GOOGLE_MAPS_API_KEY"),
            gemini_api_key: optional_secret("GEMINI_API_KEY"),
        };

        if config.uses_placeholder_credentials() {
            tracing::warn!(
                "Using placeholder Supabase credentials. Set SUPABASE_URL and SUPABASE_ANON_KEY."
            );
        }
        if config.google_maps_api_key.is_none() {
            tracing::warn!("GOOGLE_MAPS_API_KEY not set; maps and geocoding will use fallbacks");
        }
        if config.gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set; classification will use fallbacks");
        }

        Ok(config)
    }

    /// Config for tests: placeholder project, fixed JWT secret, no API keys.
    pub fn test_default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            site_url: "http://localhost:5173".to_string(),
            port: 8080,
            supabase_service_key: None,
            supabase_jwt_secret: b"test_jwt_secret_32_bytes_minimum!".to_vec(),
            google_maps_api_key: None,
            gemini_api_key: None,
        }
    }

    pub fn uses_placeholder_credentials(&self) -> bool {
        self.supabase_url == PLACEHOLDER_SUPABASE_URL || self.supabase_anon_key == PLACEHOLDER_ANON_KEY
    }

    /// Where the provider sends users back after email confirmation or OAuth.
    pub fn auth_callback_url(&self) -> String {
        format!("{}/auth/callback", self.site_url)
    }
}

/// Read an env var, treating empty values as unset.
fn optional_secret(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
