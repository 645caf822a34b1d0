//! Plugin and package version numbers.
//!
//! A version is a dotted list of numeric components with an optional
//! `-pre.release` part and an optional `+build` part:
//! - missing trailing components compare as zero (`1.2` == `1.2.0`)
//! - a pre-release sorts before its release (`1.0.0-rc.1` < `1.0.0`)
//! - build metadata is kept for display only and never compared

mod requirement;

pub use requirement::{Operator, RequirementParseError, VersionRequirement};

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced while parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("empty version string")]
    Empty,

    #[error("invalid component '{component}' in version '{version}'")]
    InvalidComponent { version: String, component: String },

    #[error("empty pre-release identifier in version '{0}'")]
    EmptyPreRelease(String),
}

/// One dot-separated identifier of a pre-release part.
///
/// Numeric identifiers sort before alphanumeric ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum PreIdent {
    Numeric(u64),
    Alpha(String),
}

impl fmt::Display for PreIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreIdent::Numeric(n) => write!(f, "{n}"),
            PreIdent::Alpha(s) => f.write_str(s),
        }
    }
}

/// The three textual parts of a version string.
pub(crate) struct RawParts<'a> {
    pub main: &'a str,
    pub pre_release: Vec<PreIdent>,
    pub build: Option<&'a str>,
}

/// Split `main[-pre][+build]` and parse the pre-release identifiers.
pub(crate) fn split_parts(input: &str) -> Result<RawParts<'_>, VersionParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(VersionParseError::Empty);
    }

    let (rest, build) = match trimmed.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (trimmed, None),
    };
    let (main, pre) = match rest.split_once('-') {
        Some((main, pre)) => (main, Some(pre)),
        None => (rest, None),
    };
    if main.is_empty() {
        return Err(VersionParseError::Empty);
    }

    let mut pre_release = Vec::new();
    if let Some(pre) = pre {
        for ident in pre.split('.') {
            if ident.is_empty() {
                return Err(VersionParseError::EmptyPreRelease(trimmed.to_string()));
            }
            pre_release.push(match ident.parse::<u64>() {
                Ok(n) => PreIdent::Numeric(n),
                Err(_) => PreIdent::Alpha(ident.to_string()),
            });
        }
    }

    Ok(RawParts {
        main,
        pre_release,
        build,
    })
}

/// Compare two pre-release lists; an empty list is a release and sorts last.
pub(crate) fn compare_pre_release(a: &[PreIdent], b: &[PreIdent]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

/// A concrete, comparable version.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
    pre_release: Vec<PreIdent>,
    build: Option<String>,
}

impl Version {
    /// Parse a version string such as `1.2.3`, `2.0-beta.1` or `1.0+build.5`.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let parts = split_parts(input)?;
        let components = parts
            .main
            .split('.')
            .map(|component| {
                component
                    .parse::<u64>()
                    .map_err(|_| VersionParseError::InvalidComponent {
                        version: input.trim().to_string(),
                        component: component.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            components,
            pre_release: parts.pre_release,
            build: parts.build.map(str::to_string),
        })
    }

    /// Component at `index`, zero when the version is shorter.
    pub fn component(&self, index: usize) -> u64 {
        self.components.get(index).copied().unwrap_or(0)
    }

    pub fn major(&self) -> u64 {
        self.component(0)
    }

    pub fn minor(&self) -> u64 {
        self.component(1)
    }

    pub fn patch(&self) -> u64 {
        self.component(2)
    }

    /// Whether this version carries a pre-release part.
    pub fn is_pre_release(&self) -> bool {
        !self.pre_release.is_empty()
    }

    pub(crate) fn components(&self) -> &[u64] {
        &self.components
    }

    pub(crate) fn pre_release(&self) -> &[PreIdent] {
        &self.pre_release
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for index in 0..len {
            match self.component(index).cmp(&other.component(index)) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        compare_pre_release(&self.pre_release, &other.pre_release)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main: Vec<String> = self.components.iter().map(u64::to_string).collect();
        f.write_str(&main.join("."))?;
        if !self.pre_release.is_empty() {
            let pre: Vec<String> = self.pre_release.iter().map(ToString::to_string).collect();
            write!(f, "-{}", pre.join("."))?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(serde::de::Error::custom)
    }
}
