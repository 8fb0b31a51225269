//! Backend REST client for the stockwatch analysis service.
//!
//! Exposes the backend HTTP surface as the [`BackendApi`] trait and provides
//! the reqwest-based [`HttpBackend`] implementation. With the `test-util`
//! feature, a scripted in-memory backend and a `mockall` mock are exported
//! for downstream tests.

pub mod backend;
pub mod client;
pub mod error;
pub mod wire;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::BackendApi;
#[cfg(any(test, feature = "test-util"))]
pub use backend::MockBackendApi;
pub use client::{HttpBackend, DEFAULT_TIMEOUT};
pub use error::{ApiError, ApiResult};
pub use wire::ExportPayload;
