// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod classifier;
pub mod loader;
pub mod maps;
pub mod reports;
pub mod retry;

pub use classifier::{Classification, ClassificationSource, ClassifierClient};
pub use loader::{ResourceFetcher, ResourceLoader};
pub use maps::MapsService;
pub use reports::ReportService;
pub use retry::{retry, Backoff, LoadError, RetryPolicy, TerminalPolicy};
