// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase access token authentication middleware.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cookie carrying the Supabase access token.
pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";

/// Audience Supabase puts in tokens of signed-in users.
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

/// Supabase JWT claims.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (auth user ID)
    pub sub: String,
    /// Audience ("authenticated")
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: usize,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Authenticated caller extracted from the access token.
#[derive(Debug, Clone)]
pub struct RequestUser {
    pub user_id: String,
    pub email: Option<String>,
}

/// Middleware that requires a valid Supabase access token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) => token.trim().to_string(),
            None => return Err(AppError::Unauthorized),
        }
    };

    let claims = verify_access_token(&token, &state.config.supabase_jwt_secret)?;

    request.extensions_mut().insert(RequestUser {
        user_id: claims.sub,
        email: claims.email,
    });

    Ok(next.run(request).await)
}

/// Validate an HS256 Supabase access token.
pub fn verify_access_token(token: &str, secret: &[u8]) -> Result<Claims, AppError> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUTHENTICATED_AUDIENCE]);

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        AppError::InvalidToken
    })?;

    if token_data.claims.sub.is_empty() {
        return Err(AppError::InvalidToken);
    }
    Ok(token_data.claims)
}

/// Mint an access token the way Supabase does (tests, local tooling).
pub fn create_access_token(
    user_id: &str,
    email: Option<&str>,
    secret: &[u8],
    ttl_secs: usize,
) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        aud: AUTHENTICATED_AUDIENCE.to_string(),
        exp: now + ttl_secs,
        iat: now,
        email: email.map(String::from),
        role: Some(AUTHENTICATED_AUDIENCE.to_string()),
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test_jwt_secret_32_bytes_minimum!";

    #[test]
    fn test_token_round_trip() {
        let token = create_access_token("user-1", Some("a@b.c"), SECRET, 3600).unwrap();
        let claims = verify_access_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_access_token("user-1", None, SECRET, 3600).unwrap();
        assert!(matches!(
            verify_access_token(&token, b"another_secret_that_is_long_enough"),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        use jsonwebtoken::{encode, EncodingKey, Header};
        let claims = Claims {
            sub: "user-1".to_string(),
            aud: "anon".to_string(),
            exp: usize::MAX / 2,
            iat: 0,
            email: None,
            role: Some("anon".to_string()),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(verify_access_token(&token, SECRET).is_err());
    }
}
