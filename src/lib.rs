// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! EcoPilot: community waste reporting backed by Supabase
//!
//! This crate provides the resilient loaders for Google Maps and Gemini,
//! the session-synchronized auth store, and the backend API for submitting
//! and tracking waste reports.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::ProfileStore;
use services::{ClassifierClient, MapsService, ReportService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub profiles: Arc<dyn ProfileStore>,
    pub reports: ReportService,
    pub maps: MapsService,
    pub classifier: ClassifierClient,
}
