//! Package versions and dependency version ranges.
//!
//! Package manifests are looser than strict semver: `1.0` and `2` are valid
//! versions and mean `1.0.0` and `2.0.0`. Ranges use interval notation:
//!
//! | Text | Meaning |
//! |---|---|
//! | `1.0` | `>= 1.0.0` |
//! | `[1.0]` | `== 1.0.0` |
//! | `(1.0,)` | `> 1.0.0` |
//! | `(,2.0]` | `<= 2.0.0` |
//! | `[1.0,2.0)` | `>= 1.0.0, < 2.0.0` |

use crate::bundler::error::{Error, Result};
use semver::Version;
use std::{fmt, str::FromStr};

/// Parses a package version, padding missing minor/patch components with zero.
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::format("version is empty"));
    }

    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);
    let normalized = match core.split('.').count() {
        1 => format!("{core}.0.0{suffix}"),
        2 => format!("{core}.0{suffix}"),
        3 => trimmed.to_string(),
        _ => {
            return Err(Error::format(format!(
                "invalid version `{trimmed}`: expected at most three numeric components"
            )));
        }
    };

    Version::parse(&normalized)
        .map_err(|e| Error::format(format!("invalid version `{trimmed}`: {e}")))
}

/// A version interval a dependency must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRange {
    /// Lower bound, `None` when unbounded.
    pub min: Option<Version>,
    /// Whether `min` itself is allowed.
    pub min_inclusive: bool,
    /// Upper bound, `None` when unbounded.
    pub max: Option<Version>,
    /// Whether `max` itself is allowed.
    pub max_inclusive: bool,
}

impl VersionRange {
    /// `>= version`
    pub fn at_least(version: Version) -> Self {
        Self {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    /// `== version`
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
        }
    }

    /// Whether `version` falls inside the interval.
    pub fn satisfies(&self, version: &Version) -> bool {
        let above_min = match &self.min {
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
            None => true,
        };
        let below_max = match &self.max {
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
            None => true,
        };
        above_min && below_max
    }

    /// Parses interval notation or a bare minimum version.
    pub fn parse(input: &str) -> Result<Self> {
        let text = input.trim();
        if text.is_empty() {
            return Err(Error::format("version range is empty"));
        }

        let opens = text.starts_with('[') || text.starts_with('(');
        let closes = text.ends_with(']') || text.ends_with(')');
        if !opens && !closes {
            return Ok(Self::at_least(parse_version(text)?));
        }
        if !(opens && closes) || text.len() < 3 {
            return Err(Error::format(format!("invalid version range `{text}`")));
        }

        let min_inclusive = text.starts_with('[');
        let max_inclusive = text.ends_with(']');
        let inner = &text[1..text.len() - 1];

        let Some((low, high)) = inner.split_once(',') else {
            // A single version inside brackets is only meaningful as an exact match.
            if !(min_inclusive && max_inclusive) {
                return Err(Error::format(format!(
                    "invalid version range `{text}`: a single version must use `[v]`"
                )));
            }
            return Ok(Self::exact(parse_version(inner)?));
        };

        if high.contains(',') {
            return Err(Error::format(format!(
                "invalid version range `{text}`: too many bounds"
            )));
        }

        let min = optional_bound(low)?;
        let max = optional_bound(high)?;
        if min.is_none() && max.is_none() {
            return Err(Error::format(format!(
                "invalid version range `{text}`: no bounds given"
            )));
        }
        if let (Some(lo), Some(hi)) = (&min, &max)
            && (lo > hi || (lo == hi && !(min_inclusive && max_inclusive)))
        {
            return Err(Error::format(format!(
                "invalid version range `{text}`: empty interval"
            )));
        }

        Ok(Self {
            min,
            min_inclusive,
            max,
            max_inclusive,
        })
    }
}

fn optional_bound(text: &str) -> Result<Option<Version>> {
    let text = text.trim();
    if text.is_empty() {
        Ok(None)
    } else {
        parse_version(text).map(Some)
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (Some(min), None) if self.min_inclusive => write!(f, "{min}"),
            (Some(min), Some(max)) if min == max => write!(f, "[{min}]"),
            _ => {
                f.write_str(if self.min_inclusive { "[" } else { "(" })?;
                if let Some(min) = &self.min {
                    write!(f, "{min}")?;
                }
                f.write_str(",")?;
                if let Some(max) = &self.max {
                    write!(f, "{max}")?;
                }
                f.write_str(if self.max_inclusive { "]" } else { ")" })
            }
        }
    }
}
