//! Core infrastructure for fixall.
//!
//! This crate provides the pieces the aggregation engine is built from:
//! - Workspace snapshot model (units, groups, dialects)
//! - Diagnostic and aggregation result types
//! - Scope taxonomy and default title composition
//! - Collaborator traits and the cancellable suspension-point helper
//! - Progress reporting
//! - Error types and error codes
//! - Configuration resolution
//! - JSON output types for CLI responses

pub mod adapter;
pub mod config;
pub mod error;
pub mod output;
pub mod progress;
pub mod scope;
pub mod types;
pub mod workspace;
