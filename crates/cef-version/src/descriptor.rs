//! Composite version identifier parsing and formatting.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Errors produced while parsing a version descriptor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,

    #[error("version '{input}' has leading or trailing whitespace")]
    SurroundingWhitespace { input: String },

    #[error("version '{input}' is missing the {segment} segment (expected framework+hash+tag-version)")]
    MissingSegment { input: String, segment: &'static str },

    #[error("version '{input}' has an empty {segment} segment")]
    EmptySegment { input: String, segment: &'static str },

    #[error("version '{input}' has too many '+' separated segments")]
    TooManySegments { input: String },

    #[error("{segment} '{value}' in version '{input}' must be dot-separated numbers")]
    NotNumeric {
        input: String,
        segment: &'static str,
        value: String,
    },
}

/// Parsed `{framework}+{hash}+{tag}-{platform_version}` identifier.
///
/// Equality and ordering are defined on the parsed parts. Numeric segments
/// compare component-wise, so `120.1.10` sorts after `120.1.9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionDescriptor {
    framework: String,
    build_hash: String,
    platform_tag: String,
    platform_version: String,
}

impl VersionDescriptor {
    /// Parse a composite version string.
    ///
    /// Padded input is rejected rather than trimmed, so formatting a parsed
    /// descriptor always reproduces its input.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        if input.trim().is_empty() {
            return Err(VersionError::Empty);
        }
        if input.trim() != input {
            return Err(VersionError::SurroundingWhitespace {
                input: input.to_string(),
            });
        }

        let mut parts = input.split('+');
        let framework = parts.next().unwrap_or_default();
        let build_hash = parts.next().ok_or_else(|| VersionError::MissingSegment {
            input: input.to_string(),
            segment: "build hash",
        })?;
        let platform = parts.next().ok_or_else(|| VersionError::MissingSegment {
            input: input.to_string(),
            segment: "platform",
        })?;
        if parts.next().is_some() {
            return Err(VersionError::TooManySegments {
                input: input.to_string(),
            });
        }

        let (platform_tag, platform_version) =
            platform
                .split_once('-')
                .ok_or_else(|| VersionError::MissingSegment {
                    input: input.to_string(),
                    segment: "platform version",
                })?;

        for (segment, value) in [
            ("framework version", framework),
            ("build hash", build_hash),
            ("platform tag", platform_tag),
            ("platform version", platform_version),
        ] {
            if value.is_empty() {
                return Err(VersionError::EmptySegment {
                    input: input.to_string(),
                    segment,
                });
            }
        }

        for (segment, value) in [
            ("framework version", framework),
            ("platform version", platform_version),
        ] {
            if numeric_components(value).is_none() {
                return Err(VersionError::NotNumeric {
                    input: input.to_string(),
                    segment,
                    value: value.to_string(),
                });
            }
        }

        Ok(Self {
            framework: framework.to_string(),
            build_hash: build_hash.to_string(),
            platform_tag: platform_tag.to_string(),
            platform_version: platform_version.to_string(),
        })
    }

    /// Framework version, e.g. `120.1.10`
    pub fn framework(&self) -> &str {
        &self.framework
    }

    /// Source revision hash, e.g. `g3ce3184`
    pub fn build_hash(&self) -> &str {
        &self.build_hash
    }

    /// Embedded platform name, e.g. `chromium`
    pub fn platform_tag(&self) -> &str {
        &self.platform_tag
    }

    /// Embedded platform version, e.g. `120.0.6099.129`
    pub fn platform_version(&self) -> &str {
        &self.platform_version
    }

    /// Major framework version (first numeric component)
    pub fn major(&self) -> u64 {
        numeric_components(&self.framework)
            .and_then(|c| c.first().copied())
            .unwrap_or(0)
    }
}

/// Split a dotted numeric string into components; None if any part is not a number
fn numeric_components(value: &str) -> Option<Vec<u64>> {
    value
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                part.parse::<u64>().ok()
            }
        })
        .collect()
}

impl fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}+{}+{}-{}",
            self.framework, self.build_hash, self.platform_tag, self.platform_version
        )
    }
}

impl FromStr for VersionDescriptor {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionDescriptor {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionDescriptor> for String {
    fn from(value: VersionDescriptor) -> Self {
        value.to_string()
    }
}

impl Ord for VersionDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        let key = |v: &Self| {
            (
                numeric_components(&v.framework).unwrap_or_default(),
                numeric_components(&v.platform_version).unwrap_or_default(),
            )
        };
        key(self)
            .cmp(&key(other))
            .then_with(|| self.build_hash.cmp(&other.build_hash))
            .then_with(|| self.platform_tag.cmp(&other.platform_tag))
            // Tie-break on the raw parts so Ord agrees with Eq ("1.0" vs "1.00")
            .then_with(|| self.framework.cmp(&other.framework))
            .then_with(|| self.platform_version.cmp(&other.platform_version))
    }
}

impl PartialOrd for VersionDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
