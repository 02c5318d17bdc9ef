//! Integration tests module
//!
//! End-to-end tests of the scrape pipeline against a scripted rendering
//! backend:
//! - route × date expansion, extraction and fill-rate computation
//! - bounded concurrency and the run deadline
//! - retry, blocked-page and timeout handling

pub mod error_scenarios;
pub mod fixtures;
pub mod pipeline_test;
