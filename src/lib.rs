//! Library crate for matchday-back, exposing modules for the binaries and integration tests.

/// Runtime configuration.
pub mod config;
/// Storage layer.
pub mod dao;
/// Wire payloads.
pub mod dto;
/// Error taxonomy and HTTP mapping.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Domain services.
pub mod services;
/// Shared state and sessions.
pub mod state;
