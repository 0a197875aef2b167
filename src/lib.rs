//! Computes dependency version overrides that remediate known vulnerabilities.
//!
//! Given a resolved dependency graph annotated with vulnerabilities, the
//! [`OverrideExecutor`] explores minimal version overrides per vulnerability
//! and reports each distinct outcome as a [`Difference`].

pub mod executor;
pub mod logging;
pub mod model;
pub mod remediate;
pub mod traits;
pub mod version;

// Re-export common types for convenience
pub use executor::*;
pub use model::*;
pub use remediate::{Difference, RemediationError, RemediationOptions, UpgradeConfig, UpgradeLevel};
pub use traits::*;
