//! Remediate module - vulnerability remediation through version overrides.
//!
//! This module provides the building blocks of the override strategy:
//! - **Policy**: Per-package upgrade ceilings via [`UpgradeConfig`]
//! - **Options**: Run configuration and vulnerability filtering via [`RemediationOptions`]
//! - **Selection**: Minimal safe version choice via [`selector::select_best`]
//! - **Patching**: In-memory manifest rewriting via [`patcher::patch_manifest`]
//! - **Convergence**: The patch/resolve loop via [`pipeline::override_patch_vulns`]
//! - **Diffing**: Result comparison via [`Difference`]
//!
//! The concurrent exploration of remediation branches lives in
//! [`crate::executor::OverrideExecutor`].

pub mod diff;
pub mod options;
pub mod patcher;
pub mod pipeline;
pub mod selector;
pub mod traits;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export commonly used types
pub use diff::Difference;
pub use options::{MatchVuln, RemediationOptions, ResolveOptions, VulnFilter, DEFAULT_MAX_CONCURRENCY};
pub use patcher::patch_manifest;
pub use pipeline::override_patch_vulns;
pub use selector::{select_best, Selection};
pub use traits::{RemediationError, UpgradeConfig, UpgradeLevel};
