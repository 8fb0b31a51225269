//! Integration tests for stockwatch-api.
//!
//! These tests drive `HttpBackend` against a local axum server that speaks
//! the backend's REST surface.

pub mod common;
