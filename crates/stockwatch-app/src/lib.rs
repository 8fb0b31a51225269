//! stockwatch command-line client.
//!
//! Wires the backend client, job orchestrators and read-model sync into one
//! [`Application`]:
//! - TOML configuration with per-field defaults
//! - Terminal confirmation for destructive imports

pub mod app;
pub mod config;
pub mod confirm;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
