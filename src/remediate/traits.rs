//! Upgrade policy and error types for the remediation engine.
//!
//! This module defines:
//! - The per-package upgrade ceiling via [`UpgradeLevel`] and [`UpgradeConfig`]
//! - The engine's error taxonomy via [`RemediationError`]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::Ecosystem;
use crate::traits::ClientError;
use crate::version::{Diff, VersionError};

// ============================================================================
// Upgrade Policy
// ============================================================================

/// Largest version change remediation may apply to a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeLevel {
    /// Any change, including major version bumps
    #[default]
    Major,

    /// Minor and patch changes only
    Minor,

    /// Patch changes only
    Patch,

    /// The package must not be touched
    None,
}

impl UpgradeLevel {
    /// Whether a change of kind `diff` is within this level.
    pub fn allows(self, diff: Diff) -> bool {
        if diff == Diff::Same {
            return true;
        }

        match self {
            UpgradeLevel::Major => true,
            UpgradeLevel::Minor => diff != Diff::Major,
            UpgradeLevel::Patch => !matches!(diff, Diff::Major | Diff::Minor),
            UpgradeLevel::None => false,
        }
    }
}

impl fmt::Display for UpgradeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpgradeLevel::Major => "major",
            UpgradeLevel::Minor => "minor",
            UpgradeLevel::Patch => "patch",
            UpgradeLevel::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for UpgradeLevel {
    type Err = RemediationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major" => Ok(UpgradeLevel::Major),
            "minor" => Ok(UpgradeLevel::Minor),
            "patch" => Ok(UpgradeLevel::Patch),
            "none" => Ok(UpgradeLevel::None),
            other => Err(RemediationError::InvalidUpgradeLevel(other.to_string())),
        }
    }
}

/// Per-package upgrade ceilings, keyed by package name.
///
/// Packages without an explicit entry fall back to the default level, which
/// is [`UpgradeLevel::Major`] unless changed.
///
/// # Serialization
///
/// ```json
/// { "default": "minor", "packages": { "com.google.guava:guava": "none" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    #[serde(default)]
    default: UpgradeLevel,

    #[serde(default)]
    packages: BTreeMap<String, UpgradeLevel>,
}

impl UpgradeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level in effect for `package`.
    pub fn get(&self, package: &str) -> UpgradeLevel {
        self.packages.get(package).copied().unwrap_or(self.default)
    }

    /// Sets the level of one package, returning the previous explicit level.
    pub fn set(&mut self, package: impl Into<String>, level: UpgradeLevel) -> Option<UpgradeLevel> {
        self.packages.insert(package.into(), level)
    }

    pub fn set_default(&mut self, level: UpgradeLevel) {
        self.default = level;
    }

    /// Builds a config from command-line style entries.
    ///
    /// Each entry is either `LEVEL` (sets the default) or `PACKAGE:LEVEL`.
    /// Package names may themselves contain `:` (Maven `group:artifact`), so
    /// the level is taken from after the last `:`.
    ///
    /// # Errors
    ///
    /// Returns [`RemediationError::InvalidUpgradeLevel`] for unknown levels.
    pub fn parse_entries<I, S>(entries: I) -> Result<Self, RemediationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            match entry.rsplit_once(':') {
                Some((package, level)) => {
                    config.set(package, level.parse()?);
                }
                None => config.set_default(entry.parse()?),
            }
        }
        Ok(config)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while computing override patches.
#[derive(Error, Debug)]
pub enum RemediationError {
    /// None of the targeted vulnerabilities can be fixed by overrides
    #[error("cannot fix vulns by overrides: {0}")]
    Infeasible(String),

    /// Resolver or registry failure
    #[error("Resolution client error: {0}")]
    Client(#[from] ClientError),

    /// A version of the package being remediated failed to parse
    #[error("Failed to parse version '{version}': {reason}")]
    VersionParse { version: String, reason: String },

    /// The manifest's ecosystem does not support override patching
    #[error("Unsupported ecosystem for override patching: {0}")]
    UnsupportedEcosystem(Ecosystem),

    /// An upgrade level string was not recognised
    #[error("Invalid upgrade level: '{0}' (expected major, minor, patch or none)")]
    InvalidUpgradeLevel(String),

    /// A remediation task panicked or was cancelled
    #[error("Remediation task failed: {0}")]
    TaskFailed(String),
}

impl RemediationError {
    /// Whether the error only concerns a single remediation branch and must
    /// not abort its siblings.
    pub fn is_branch_local(&self) -> bool {
        matches!(
            self,
            RemediationError::Infeasible(_)
                | RemediationError::Client(_)
                | RemediationError::VersionParse { .. }
        )
    }
}

impl From<VersionError> for RemediationError {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::Empty => RemediationError::VersionParse {
                version: String::new(),
                reason: err.to_string(),
            },
            VersionError::Invalid {
                ref version,
                ref reason,
                ..
            } => RemediationError::VersionParse {
                version: version.clone(),
                reason: reason.clone(),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
