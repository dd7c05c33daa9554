// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! EcoPilot API Server
//!
//! Accepts waste reports from signed-in users and proxies the Google Maps
//! and Gemini APIs for the frontend.

use ecopilot::{
    config::Config,
    db::SupabaseDb,
    services::{ClassifierClient, MapsService, ReportService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting EcoPilot API");

    // Server-side table access uses the service role key when present
    let mut db = SupabaseDb::new(&config.supabase_url, &config.supabase_anon_key);
    match &config.supabase_service_key {
        Some(key) => db = db.with_bearer_token(key),
        None => tracing::warn!("SUPABASE_SERVICE_ROLE_KEY not set; table access limited by RLS"),
    }
    let db = Arc::new(db);
    tracing::info!(url = %config.supabase_url, "Supabase client initialized");

    let maps = MapsService::new(config.google_maps_api_key.clone());
    let classifier = ClassifierClient::new(config.gemini_api_key.clone());
    let reports = ReportService::new(db.clone(), db.clone(), db.clone());

    // Warm the map script registry; failures are retried on first request
    if config.google_maps_api_key.is_some() {
        let maps = maps.clone();
        tokio::spawn(async move {
            if let Err(e) = maps.load_script().await {
                tracing::warn!(error = %e, "Map script preload failed");
            }
        });
    }

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        profiles: db,
        reports,
        maps,
        classifier,
    });

    // Build router
    let app = ecopilot::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ecopilot=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
