//! Common test utilities and fixtures for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: Vendor response bodies and mock server helpers
//! - `logger`: Structured test logging infrastructure

pub mod fixtures;
pub mod logger;
