//! Boundary with the external completion service.

pub mod api_types;
pub mod client;
pub mod schema;
pub mod types;

pub use client::{CompletionRequest, CompletionService, GeminiClient, Part};
