//! Version requirement expressions such as `>=1.2`, `^2.0` or `>=1.0 <2.0`.
//!
//! An expression is a list of criteria separated by whitespace or commas;
//! a version is accepted only when every criterion accepts it. An empty
//! expression or `*` accepts any version, and a bare version means `==`.
//!
//! Operator family:
//!
//! | operator | accepts `v` when |
//! |---|---|
//! | `==`, `=` | `v == base` |
//! | `!=` | `v != base` |
//! | `>`, `>=`, `<`, `<=` | the usual ordering |
//! | `~` | `v >= base` and major and minor match (patch-level updates only) |
//! | `^` | `v >= base` and major matches (minor-level updates allowed) |
//! | `~=` | `v >= base` and every component but the last matches |
//!
//! Base versions may contain wildcard components (`*`, `x`, `X`) which
//! match anything; a trailing wildcard extends to all following components.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::{PreIdent, Version, VersionParseError, compare_pre_release, split_parts};

/// Errors produced while parsing a requirement expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementParseError {
    #[error("operator '{0}' is missing a version")]
    MissingVersion(String),

    #[error("invalid version '{version}': {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: VersionParseError,
    },

    #[error("'~=' needs at least two version components, got '{0}'")]
    CompatibleTooShort(String),
}

/// Comparison operator of a single criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Any,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Tilde,
    Caret,
    Compatible,
}

const OPERATOR_TOKENS: &[(&str, Operator)] = &[
    ("==", Operator::Eq),
    ("=", Operator::Eq),
    ("!=", Operator::Ne),
    (">=", Operator::Ge),
    (">", Operator::Gt),
    ("<=", Operator::Le),
    ("<", Operator::Lt),
    ("~=", Operator::Compatible),
    ("~", Operator::Tilde),
    ("^", Operator::Caret),
];

impl Operator {
    /// Longest operator token that prefixes `input`, with the remaining text.
    pub fn match_prefix(input: &str) -> Option<(Operator, &str)> {
        OPERATOR_TOKENS
            .iter()
            .filter(|(token, _)| input.starts_with(token))
            .max_by_key(|(token, _)| token.len())
            .map(|(token, op)| (*op, &input[token.len()..]))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Any => "*",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Tilde => "~",
            Operator::Caret => "^",
            Operator::Compatible => "~=",
        }
    }
}

/// A base version that may contain wildcard components (`None`).
#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionPattern {
    components: Vec<Option<u64>>,
    pre_release: Vec<PreIdent>,
}

impl VersionPattern {
    fn parse(input: &str) -> Result<Self, VersionParseError> {
        let parts = split_parts(input)?;
        let components = parts
            .main
            .split('.')
            .map(|component| match component {
                "*" | "x" | "X" => Ok(None),
                number => number.parse::<u64>().map(Some).map_err(|_| {
                    VersionParseError::InvalidComponent {
                        version: input.trim().to_string(),
                        component: number.to_string(),
                    }
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            components,
            pre_release: parts.pre_release,
        })
    }

    /// Component at `index`; past the end a trailing wildcard repeats,
    /// otherwise the component is zero.
    fn component(&self, index: usize) -> Option<u64> {
        match self.components.get(index) {
            Some(component) => *component,
            None => match self.components.last() {
                Some(None) => None,
                _ => Some(0),
            },
        }
    }

    fn has_wildcard(&self) -> bool {
        self.components.iter().any(Option::is_none)
    }

    /// Ordering of `version` relative to this pattern.
    fn compare(&self, version: &Version) -> Ordering {
        let len = self.components.len().max(version.components().len());
        for index in 0..len {
            let Some(base) = self.component(index) else {
                continue;
            };
            match version.component(index).cmp(&base) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        if self.has_wildcard() && self.pre_release.is_empty() {
            return Ordering::Equal;
        }
        compare_pre_release(version.pre_release(), &self.pre_release)
    }

    fn same_component(&self, version: &Version, index: usize) -> bool {
        self.component(index)
            .is_none_or(|base| base == version.component(index))
    }
}

/// One `operator version` term of a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Criterion {
    operator: Operator,
    base: Option<VersionPattern>,
}

impl Criterion {
    fn parse(token: &str) -> Result<Self, RequirementParseError> {
        if token == "*" {
            return Ok(Self {
                operator: Operator::Any,
                base: None,
            });
        }

        let (operator, rest) = Operator::match_prefix(token).unwrap_or((Operator::Eq, token));
        let rest = rest.trim();
        if rest.is_empty() {
            return Err(RequirementParseError::MissingVersion(token.to_string()));
        }

        let base =
            VersionPattern::parse(rest).map_err(|source| RequirementParseError::InvalidVersion {
                version: rest.to_string(),
                source,
            })?;
        if operator == Operator::Compatible && base.components.len() < 2 {
            return Err(RequirementParseError::CompatibleTooShort(rest.to_string()));
        }

        Ok(Self {
            operator,
            base: Some(base),
        })
    }

    /// Whether `version` satisfies this criterion.
    fn accept(&self, version: &Version) -> bool {
        let Some(base) = &self.base else {
            return true;
        };
        let ordering = base.compare(version);

        match self.operator {
            Operator::Any => true,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Tilde => {
                ordering != Ordering::Less
                    && base.same_component(version, 0)
                    && base.same_component(version, 1)
            }
            Operator::Caret => ordering != Ordering::Less && base.same_component(version, 0),
            Operator::Compatible => {
                let fixed = base.components.len() - 1;
                ordering != Ordering::Less
                    && (0..fixed).all(|index| base.same_component(version, index))
            }
        }
    }
}

/// A parsed requirement expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequirement {
    raw: String,
    criteria: Vec<Criterion>,
}

impl VersionRequirement {
    /// Requirement that accepts every version.
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            criteria: Vec::new(),
        }
    }

    /// Parse a requirement expression.
    pub fn parse(expr: &str) -> Result<Self, RequirementParseError> {
        let raw = expr.trim();
        let tokens: Vec<&str> = raw
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|token| !token.is_empty())
            .collect();

        let mut criteria = Vec::with_capacity(tokens.len());
        let mut index = 0;
        while index < tokens.len() {
            let token = tokens[index];
            // Allow `>= 1.0` by gluing a lone operator to the next token.
            let is_bare_operator = Operator::match_prefix(token)
                .is_some_and(|(_, rest)| rest.is_empty());
            if is_bare_operator && index + 1 < tokens.len() {
                criteria.push(Criterion::parse(&format!("{token}{}", tokens[index + 1]))?);
                index += 2;
            } else {
                criteria.push(Criterion::parse(token)?);
                index += 1;
            }
        }

        Ok(Self {
            raw: if raw.is_empty() { "*".to_string() } else { raw.to_string() },
            criteria,
        })
    }

    /// Whether `version` satisfies every criterion.
    pub fn accept(&self, version: &Version) -> bool {
        self.criteria.iter().all(|criterion| criterion.accept(version))
    }

    /// Whether this requirement accepts any version at all.
    pub fn is_any(&self) -> bool {
        self.criteria
            .iter()
            .all(|criterion| criterion.operator == Operator::Any)
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for VersionRequirement {
    type Err = RequirementParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
