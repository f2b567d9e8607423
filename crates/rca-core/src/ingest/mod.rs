//! Causality table ingestion.

pub mod classify;
pub mod loader;
pub mod reader;
pub mod scores;
