//! fixall: scoped diagnostic aggregation engine
//!
//! Given a scope (one unit, one group, or every group of the triggering
//! group's dialect), computes the diagnostics a "fix all" action must
//! address, bucketed by the unit that owns each one.

// Core infrastructure - re-exported from fixall-core
pub use fixall_core::adapter;
pub use fixall_core::config;
pub use fixall_core::error;
pub use fixall_core::output;
pub use fixall_core::progress;
pub use fixall_core::scope;
pub use fixall_core::types;
pub use fixall_core::workspace;

// Engine
pub mod aggregate;
pub mod collector;
pub mod generated;
pub mod identity;
pub mod partition;

// Collaborators replayed from recorded analysis files
pub mod recorded;

#[cfg(test)]
mod test_helpers;
