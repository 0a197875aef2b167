//! Ecosystem-aware version parsing and ordering.
//!
//! Two families of versions are supported:
//! - **Maven**: tokenised comparison following Maven's qualifier rules
//! - **SemVer** (npm, crates.io): delegated to the `semver` crate
//!
//! On top of the plain ecosystem ordering, [`ordering_for`] selects a
//! [`VersionOrdering`] strategy per package. Some packages need a
//! non-standard order to keep upgrade scans from crossing into an unwanted
//! version line (see [`FlavorOrdering`] and [`LegacyDateOrdering`]).

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::model::{Ecosystem, VersionKey};

/// Errors raised while parsing a version string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,

    #[error("invalid {ecosystem} version '{version}': {reason}")]
    Invalid {
        ecosystem: Ecosystem,
        version: String,
        reason: String,
    },
}

/// Kind of change between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Diff {
    Same,
    Major,
    Minor,
    Patch,
    Prerelease,
    /// Differences below the patch component (build metadata, extra
    /// components, qualifiers)
    Other,
}

// ============================================================================
// Parsed versions
// ============================================================================

/// A parsed version of some ecosystem.
#[derive(Debug, Clone)]
pub enum Version {
    Maven(MavenVersion),
    Semver { raw: String, parsed: semver::Version },
}

impl Version {
    pub fn parse(ecosystem: Ecosystem, raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        match ecosystem {
            Ecosystem::Maven => MavenVersion::parse(trimmed).map(Version::Maven),
            Ecosystem::Npm | Ecosystem::Cargo => {
                let stripped = trimmed.trim_start_matches(['v', '=']);
                semver::Version::parse(stripped)
                    .map(|parsed| Version::Semver {
                        raw: trimmed.to_string(),
                        parsed,
                    })
                    .map_err(|e| VersionError::Invalid {
                        ecosystem,
                        version: raw.to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    }

    /// The version text as it was given.
    pub fn as_str(&self) -> &str {
        match self {
            Version::Maven(v) => &v.raw,
            Version::Semver { raw, .. } => raw,
        }
    }

    /// Plain ecosystem ordering.
    pub fn compare(&self, other: &Version) -> Ordering {
        match (self, other) {
            (Version::Maven(a), Version::Maven(b)) => a.compare(b),
            (Version::Semver { parsed: a, .. }, Version::Semver { parsed: b, .. }) => a.cmp(b),
            // Versions of different ecosystems never meet in practice.
            _ => self.as_str().cmp(other.as_str()),
        }
    }

    /// Magnitude of the change from `self` to `other`.
    pub fn difference(&self, other: &Version) -> Diff {
        match (self, other) {
            (Version::Maven(a), Version::Maven(b)) => a.difference(b),
            (Version::Semver { parsed: a, .. }, Version::Semver { parsed: b, .. }) => {
                if a.major != b.major {
                    Diff::Major
                } else if a.minor != b.minor {
                    Diff::Minor
                } else if a.patch != b.patch {
                    Diff::Patch
                } else if a.pre != b.pre {
                    Diff::Prerelease
                } else if a.build != b.build {
                    Diff::Other
                } else {
                    Diff::Same
                }
            }
            _ => Diff::Major,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One token of a Maven version.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    /// Digits with leading zeros stripped
    Number(String),
    /// Normalised qualifier; `""` is a release
    Qualifier(String),
}

const QUALIFIER_ORDER: [&str; 7] = ["alpha", "beta", "milestone", "rc", "snapshot", "", "sp"];

fn qualifier_rank(qualifier: &str) -> usize {
    QUALIFIER_ORDER
        .iter()
        .position(|known| *known == qualifier)
        .unwrap_or(QUALIFIER_ORDER.len())
}

fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    qualifier_rank(a)
        .cmp(&qualifier_rank(b))
        .then_with(|| a.cmp(b))
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl Item {
    fn from_token(token: &str, numeric: bool) -> Self {
        if numeric {
            let trimmed = token.trim_start_matches('0');
            return Item::Number(if trimmed.is_empty() { "0" } else { trimmed }.to_string());
        }
        let normalised = match token {
            "a" => "alpha",
            "b" => "beta",
            "m" => "milestone",
            "cr" => "rc",
            "ga" | "final" | "release" => "",
            other => other,
        };
        Item::Qualifier(normalised.to_string())
    }

    fn compare(&self, other: Option<&Item>) -> Ordering {
        match (self, other) {
            (Item::Number(a), Some(Item::Number(b))) => compare_numbers(a, b),
            (Item::Number(_), Some(Item::Qualifier(_))) => Ordering::Greater,
            (Item::Qualifier(_), Some(Item::Number(_))) => Ordering::Less,
            (Item::Qualifier(a), Some(Item::Qualifier(b))) => compare_qualifiers(a, b),
            (Item::Number(a), None) => compare_numbers(a, "0"),
            (Item::Qualifier(a), None) => compare_qualifiers(a, ""),
        }
    }
}

/// Drops release qualifiers and the zeros trailing each numeric run, so that
/// `1.0.0`, `1` and `1.0-ga` share one representation.
fn normalise(items: Vec<Item>) -> Vec<Item> {
    let mut out: Vec<Item> = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Item::Qualifier(q) if q.is_empty() => {}
            Item::Qualifier(q) => {
                strip_trailing_zeros(&mut out);
                out.push(Item::Qualifier(q));
            }
            number => out.push(number),
        }
    }
    strip_trailing_zeros(&mut out);
    out
}

fn strip_trailing_zeros(items: &mut Vec<Item>) {
    while matches!(items.last(), Some(Item::Number(n)) if n == "0") {
        items.pop();
    }
}

/// A Maven version, tokenised for comparison.
#[derive(Debug, Clone)]
pub struct MavenVersion {
    raw: String,
    items: Vec<Item>,
}

impl MavenVersion {
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '.' | '-' | '_' | '+')))
        {
            return Err(VersionError::Invalid {
                ecosystem: Ecosystem::Maven,
                version: raw.to_string(),
                reason: format!("unexpected character '{bad}'"),
            });
        }

        let lower = raw.to_ascii_lowercase();
        let mut items = Vec::new();
        let mut token = String::new();
        let mut numeric = false;
        for c in lower.chars() {
            if matches!(c, '.' | '-' | '_' | '+') {
                if !token.is_empty() {
                    items.push(Item::from_token(&token, numeric));
                    token.clear();
                }
                continue;
            }
            let digit = c.is_ascii_digit();
            if !token.is_empty() && digit != numeric {
                items.push(Item::from_token(&token, numeric));
                token.clear();
            }
            numeric = digit;
            token.push(c);
        }
        if !token.is_empty() {
            items.push(Item::from_token(&token, numeric));
        }

        if items.is_empty() {
            return Err(VersionError::Invalid {
                ecosystem: Ecosystem::Maven,
                version: raw.to_string(),
                reason: "no version components".to_string(),
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            items: normalise(items),
        })
    }

    pub fn compare(&self, other: &MavenVersion) -> Ordering {
        let len = self.items.len().max(other.items.len());
        for i in 0..len {
            let ordering = match (self.items.get(i), other.items.get(i)) {
                (Some(a), b) => a.compare(b),
                (None, Some(b)) => b.compare(None).reverse(),
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Leading numeric components, padded to major/minor/patch.
    fn release_numbers(&self) -> [&str; 3] {
        let mut numbers = ["0"; 3];
        for (slot, item) in numbers.iter_mut().zip(self.items.iter()) {
            match item {
                Item::Number(n) => *slot = n.as_str(),
                Item::Qualifier(_) => break,
            }
        }
        numbers
    }

    pub fn difference(&self, other: &MavenVersion) -> Diff {
        if self.compare(other) == Ordering::Equal {
            return Diff::Same;
        }
        let [a_major, a_minor, a_patch] = self.release_numbers();
        let [b_major, b_minor, b_patch] = other.release_numbers();
        if a_major != b_major {
            Diff::Major
        } else if a_minor != b_minor {
            Diff::Minor
        } else if a_patch != b_patch {
            Diff::Patch
        } else {
            Diff::Other
        }
    }
}

// ============================================================================
// Ordering strategies
// ============================================================================

/// Ordering strategy used when scanning a package's version history.
pub trait VersionOrdering: Send + Sync {
    fn compare(&self, a: &Version, b: &Version) -> Ordering;
}

/// The plain ecosystem ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcosystemOrdering;

impl VersionOrdering for EcosystemOrdering {
    fn compare(&self, a: &Version, b: &Version) -> Ordering {
        a.compare(b)
    }
}

/// Keeps upgrades within one flavor of a package.
///
/// Versions carrying the flavor `suffix` and versions without it form two
/// lines. The line the current version is not on sorts entirely before the
/// current line, so an ascending scan never switches flavor.
#[derive(Debug, Clone)]
pub struct FlavorOrdering<O> {
    inner: O,
    suffix: &'static str,
    want_suffix: bool,
}

impl<O: VersionOrdering> FlavorOrdering<O> {
    pub fn new(inner: O, suffix: &'static str, current: &str) -> Self {
        Self {
            inner,
            suffix,
            want_suffix: current.ends_with(suffix),
        }
    }
}

impl<O: VersionOrdering> VersionOrdering for FlavorOrdering<O> {
    fn compare(&self, a: &Version, b: &Version) -> Ordering {
        let a_flavored = a.as_str().ends_with(self.suffix);
        let b_flavored = b.as_str().ends_with(self.suffix);
        if a_flavored == b_flavored {
            self.inner.compare(a, b)
        } else if a_flavored == self.want_suffix {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    }
}

/// Sorts legacy date-encoded versions (`20040118.003354`) before every
/// regular version.
#[derive(Debug, Clone)]
pub struct LegacyDateOrdering<O> {
    inner: O,
    prefix: &'static str,
}

impl<O: VersionOrdering> LegacyDateOrdering<O> {
    /// Date versions of the affected packages all fall in 2002-2005, and no
    /// regular release line reaches a major of 200.
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            prefix: "200",
        }
    }
}

impl<O: VersionOrdering> VersionOrdering for LegacyDateOrdering<O> {
    fn compare(&self, a: &Version, b: &Version) -> Ordering {
        let a_date = a.as_str().starts_with(self.prefix);
        let b_date = b.as_str().starts_with(self.prefix);
        match (a_date, b_date) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.inner.compare(a, b),
        }
    }
}

/// A package-specific ordering rule.
struct OrderingRule {
    ecosystem: Ecosystem,
    matches: fn(&str) -> bool,
    build: fn(&VersionKey) -> Box<dyn VersionOrdering>,
}

const GUAVA: &str = "com.google.guava:guava";

static ORDERING_RULES: &[OrderingRule] = &[
    // https://github.com/google/guava/wiki/ReleasePolicy#flavors
    OrderingRule {
        ecosystem: Ecosystem::Maven,
        matches: |name| name == GUAVA,
        build: |vk| Box::new(FlavorOrdering::new(EcosystemOrdering, "-android", &vk.version)),
    },
    // commons-io:commons-io, commons-math:commons-math, ...
    OrderingRule {
        ecosystem: Ecosystem::Maven,
        matches: |name| name.starts_with("commons-"),
        build: |_| Box::new(LegacyDateOrdering::new(EcosystemOrdering)),
    },
];

/// Selects the ordering used to scan upgrades of `vk`'s package.
pub fn ordering_for(vk: &VersionKey) -> Box<dyn VersionOrdering> {
    ORDERING_RULES
        .iter()
        .find(|rule| rule.ecosystem == vk.ecosystem() && (rule.matches)(vk.name()))
        .map(|rule| (rule.build)(vk))
        .unwrap_or_else(|| Box::new(EcosystemOrdering))
}
