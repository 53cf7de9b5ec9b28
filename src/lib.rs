// Community Board - posts, comments, accounts and image uploads behind a JSON API

// Core types and primitives
pub mod core;

// Infrastructure - document store, identity, blob storage, caching
pub mod infrastructure;

// Board records and pagination
pub mod models;

// Form rules
pub mod validation;

// Session/user, media and content access
pub mod services;

// HTTP surface
pub mod board_interface;

// Wiring
pub mod app_state;
pub mod config;
pub mod data_seeder;

// Common utilities
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
