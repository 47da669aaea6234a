// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! Python version literals and version comparisons.
//!
//! A version literal has the shape `N[.N[.N[-LEVEL[-N]]]]`, mirroring the
//! fields of `sys.version_info`. A comparison prefixes such a literal with
//! one of `>`, `<`, `>=` or `<=`.

use std::fmt;
use std::str::FromStr;

use miette::Diagnostic;
use serde::{Serialize, Serializer};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

#[cfg(test)]
#[path = "./pyver_test.rs"]
mod pyver_test;

/// Errors produced while parsing version literals and comparisons.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("The provided str was empty or whitespace.")]
    #[diagnostic(code(venvfile::version::empty))]
    Empty,

    #[error("Unexpected '-' at beginning of micro version.")]
    #[diagnostic(code(venvfile::version::dash_in_micro))]
    UnexpectedDashInMicro,

    #[error("Too many '-' in version info str.")]
    #[diagnostic(code(venvfile::version::too_many_dashes))]
    TooManyDashes,

    #[error("Too many '.' in version info str.")]
    #[diagnostic(code(venvfile::version::too_many_dots))]
    TooManyDots,

    #[error("Invalid release level '{0}' in version info str.")]
    #[diagnostic(
        code(venvfile::version::release_level),
        help("Use one of: alpha, beta, candidate, final")
    )]
    InvalidReleaseLevel(String),

    #[error("Invalid version number '{0}' in version info str.")]
    #[diagnostic(code(venvfile::version::invalid_number))]
    InvalidNumber(String),

    #[error("Negative version number '{0}' in version info str.")]
    #[diagnostic(code(venvfile::version::negative_number))]
    NegativeNumber(String),

    #[error("Invalid comparison operator '{0}'.")]
    #[diagnostic(
        code(venvfile::version::invalid_operator),
        help("Use one of: >, <, >=, <=")
    )]
    InvalidOperator(String),

    #[error("Invalid comparison operator '{found}', expected one of {}.", join_operators(expected))]
    #[diagnostic(code(venvfile::version::operator_not_allowed))]
    OperatorNotAllowed {
        found: ComparisonOperator,
        expected: Vec<ComparisonOperator>,
    },

    #[error("The provided version was not a str, but '{found}'.")]
    #[diagnostic(
        code(venvfile::version::not_text),
        help("Quote the version in the config file, e.g. \"3.10\"")
    )]
    NotText { found: String },
}

fn join_operators(ops: &[ComparisonOperator]) -> String {
    ops.iter()
        .map(|op| format!("'{op}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The release level of a Python version.
///
/// The variant order matches the order of the string values, so the derived
/// ordering agrees with how Python compares `sys.version_info`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ReleaseLevel {
    Alpha,
    Beta,
    Candidate,
    Final,
}

/// A (possibly partial) Python version info tuple.
///
/// Fields are only ever set as a prefix-consistent run: a `micro` without a
/// `minor` cannot be constructed. Comparing two values field by field with
/// `None < Some(_)` then yields Python's tuple ordering, where a strict
/// prefix sorts before the longer tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionInfo {
    major: u32,
    minor: Option<u32>,
    micro: Option<u32>,
    release_level: Option<ReleaseLevel>,
    serial: Option<u32>,
}

impl VersionInfo {
    pub fn major(major: u32) -> Self {
        Self {
            major,
            minor: None,
            micro: None,
            release_level: None,
            serial: None,
        }
    }

    pub fn major_minor(major: u32, minor: u32) -> Self {
        Self {
            minor: Some(minor),
            ..Self::major(major)
        }
    }

    pub fn major_minor_micro(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            micro: Some(micro),
            ..Self::major_minor(major, minor)
        }
    }

    pub fn with_release_level(major: u32, minor: u32, micro: u32, level: ReleaseLevel) -> Self {
        Self {
            release_level: Some(level),
            ..Self::major_minor_micro(major, minor, micro)
        }
    }

    /// The full five-component form, as reported by `sys.version_info`.
    pub fn full(major: u32, minor: u32, micro: u32, level: ReleaseLevel, serial: u32) -> Self {
        Self {
            serial: Some(serial),
            ..Self::with_release_level(major, minor, micro, level)
        }
    }

    pub fn major_version(&self) -> u32 {
        self.major
    }

    pub fn minor_version(&self) -> Option<u32> {
        self.minor
    }

    pub fn micro_version(&self) -> Option<u32> {
        self.micro
    }

    pub fn release_level(&self) -> Option<ReleaseLevel> {
        self.release_level
    }

    pub fn serial(&self) -> Option<u32> {
        self.serial
    }

    /// Number of components present (1 to 5).
    pub fn component_count(&self) -> usize {
        1 + [
            self.minor.is_some(),
            self.micro.is_some(),
            self.release_level.is_some(),
            self.serial.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;
        if let Some(minor) = self.minor {
            write!(f, ".{minor}")?;
        }
        if let Some(micro) = self.micro {
            write!(f, ".{micro}")?;
        }
        if let Some(level) = self.release_level {
            write!(f, "-{level}")?;
        }
        if let Some(serial) = self.serial {
            write!(f, "-{serial}")?;
        }
        Ok(())
    }
}

impl FromStr for VersionInfo {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_pyversion(s)
    }
}

/// Format a version info as `{major}.{minor}.{micro}-{releaselevel}-{serial}`,
/// trimmed to the components that are present.
pub fn format_version_info(version: &VersionInfo) -> String {
    version.to_string()
}

/// Integers follow Python's `int()`: surrounding whitespace, an optional
/// sign and single underscores between digits are allowed.
fn parse_version_number(token: &str) -> Result<u32, VersionError> {
    let invalid = || VersionError::InvalidNumber(token.to_string());
    let trimmed = token.trim();
    let digits = trimmed
        .strip_prefix(|c| c == '+' || c == '-')
        .unwrap_or(trimmed);
    if digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return Err(invalid());
    }
    let value: i64 = trimmed.replace('_', "").parse().map_err(|_| invalid())?;
    if value < 0 {
        return Err(VersionError::NegativeNumber(token.to_string()));
    }
    u32::try_from(value).map_err(|_| invalid())
}

fn parse_release_level(token: &str) -> Result<ReleaseLevel, VersionError> {
    let stripped = token.trim_matches(|c| c == '\'' || c == '"');
    // Exact, case sensitive match.
    stripped
        .parse()
        .map_err(|_| VersionError::InvalidReleaseLevel(token.to_string()))
}

/// Parse a Python version literal such as `3`, `3.11`, `3.11.4` or
/// `3.11.4-final-0`.
pub fn parse_pyversion(ver_str: &str) -> Result<VersionInfo, VersionError> {
    let mut parts: Vec<&str> = ver_str.split('.').collect();
    if parts.len() == 3 {
        let last = parts[2];
        if last.starts_with('-') {
            return Err(VersionError::UnexpectedDashInMicro);
        }
        let rest: Vec<&str> = last.split('-').collect();
        if rest.len() > 3 {
            return Err(VersionError::TooManyDashes);
        }
        parts.truncate(2);
        parts.extend(rest);
    } else if parts.len() > 3 {
        return Err(VersionError::TooManyDots);
    }

    let major = parse_version_number(parts[0])?;
    let mut version = VersionInfo::major(major);
    if let Some(minor) = parts.get(1) {
        version.minor = Some(parse_version_number(minor)?);
    }
    if let Some(micro) = parts.get(2) {
        version.micro = Some(parse_version_number(micro)?);
    }
    if let Some(level) = parts.get(3) {
        version.release_level = Some(parse_release_level(level)?);
    }
    if let Some(serial) = parts.get(4) {
        version.serial = Some(parse_version_number(serial)?);
    }
    Ok(version)
}

/// A comparison operator for version comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ComparisonOperator {
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "<=")]
    Le,
}

impl ComparisonOperator {
    pub const ALL: [ComparisonOperator; 4] = [Self::Gt, Self::Lt, Self::Ge, Self::Le];

    /// Operators accepted for a minimum version bound.
    pub const MIN_BOUND: [ComparisonOperator; 2] = [Self::Gt, Self::Ge];

    /// Operators accepted for a maximum version bound.
    pub const MAX_BOUND: [ComparisonOperator; 2] = [Self::Lt, Self::Le];

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Evaluate `lhs <op> rhs`.
    pub fn evaluate(&self, lhs: &VersionInfo, rhs: &VersionInfo) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Lt => lhs < rhs,
            Self::Ge => lhs >= rhs,
            Self::Le => lhs <= rhs,
        }
    }
}

/// A Python version combined with a comparison operator, e.g. `>=3.9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PyVerComparison {
    pub operator: ComparisonOperator,
    pub version: VersionInfo,
}

impl PyVerComparison {
    pub fn new(operator: ComparisonOperator, version: VersionInfo) -> Self {
        Self { operator, version }
    }

    /// Check whether `current <operator> version` holds, where `current` is
    /// the version of the interpreter building the environments.
    pub fn applies_to_current_pyversion(&self, current: &VersionInfo) -> bool {
        self.operator.evaluate(current, &self.version)
    }

    /// Parse a comparison such as `>= 3.9`. Whitespace anywhere is ignored.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        Self::parse_with(text, None)
    }

    /// Parse a comparison, rejecting operators not contained in `allowed`.
    pub fn parse_with(
        text: &str,
        allowed: Option<&[ComparisonOperator]>,
    ) -> Result<Self, VersionError> {
        let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if text.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut chars = text.chars();
        let first = chars.next().map_or(0, char::len_utf8);
        let split = match chars.next() {
            Some('=') if text.chars().count() > 2 => first + 1,
            _ => first,
        };
        let (op_str, rest) = text.split_at(split);

        let operator: ComparisonOperator = op_str
            .parse()
            .map_err(|_| VersionError::InvalidOperator(op_str.to_string()))?;
        if let Some(allowed) = allowed {
            if !allowed.contains(&operator) {
                return Err(VersionError::OperatorNotAllowed {
                    found: operator,
                    expected: allowed.to_vec(),
                });
            }
        }

        let version = parse_pyversion(rest)?;
        Ok(Self { operator, version })
    }

    fn parse_bound(
        text: &str,
        allowed: &[ComparisonOperator],
        default: ComparisonOperator,
    ) -> Result<Self, VersionError> {
        if text.starts_with(['>', '<']) {
            return Self::parse_with(text, Some(allowed));
        }
        Ok(Self::new(default, parse_pyversion(text)?))
    }

    /// Parse a minimum version. Only `>` and `>=` are allowed, and `>=` is
    /// assumed when no operator is given.
    pub fn parse_min_version(text: &str) -> Result<Self, VersionError> {
        Self::parse_bound(text, &ComparisonOperator::MIN_BOUND, ComparisonOperator::Ge)
    }

    /// Parse a maximum version. Only `<` and `<=` are allowed, and `<` is
    /// assumed when no operator is given.
    pub fn parse_max_version(text: &str) -> Result<Self, VersionError> {
        Self::parse_bound(text, &ComparisonOperator::MAX_BOUND, ComparisonOperator::Lt)
    }
}

impl fmt::Display for PyVerComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator, self.version)
    }
}

impl FromStr for PyVerComparison {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PyVerComparison {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
