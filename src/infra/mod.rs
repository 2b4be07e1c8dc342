//! Infrastructure layer for cross-cutting concerns.
//!
//! Provides foundational infrastructure including:
//! - Configuration management and validation
//! - Error handling and result types
//! - Progress reporting and advisory cancellation
//! - Memory-mapped file access

pub mod cancel;
pub mod config;
pub mod error;
pub mod file_map;
pub mod progress;
