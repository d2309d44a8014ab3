#![deny(missing_docs)]
//! Tokenpilot core library.
//!
//! Identity resolution, storage, backend client, rendering and callback routing.

/// Conversational backend client.
pub mod backend;
/// Callback action routing.
pub mod callback;
/// Configuration management.
pub mod config;
/// Number formatting.
pub mod format;
/// Action keyboards.
pub mod keyboard;
/// Persistent records.
pub mod models;
/// Tiered response rendering.
pub mod render;
/// Identity/session resolution.
pub mod resolver;
/// Progress stage table.
pub mod stages;
/// Storage layer (SQLite).
pub mod storage;
/// Typed views over structured payloads.
pub mod structured;
/// Utility functions.
pub mod utils;
/// User-facing fixed strings.
pub mod views;

#[cfg(test)]
pub mod testing;
