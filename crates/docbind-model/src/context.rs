//! Metadata contexts: the (format, projection, version) selector that picks
//! among context-specific metadata variants.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;

/// A named alternate representation format, e.g. `atom` or `rss`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AltFormat(Arc<str>);

impl AltFormat {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        AltFormat(name.into())
    }

    pub fn atom() -> Self {
        AltFormat::new("atom")
    }

    pub fn rss() -> Self {
        AltFormat::new("rss")
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AltFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error parsing a version description.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid version description '{0}'")]
pub struct VersionParseError(pub String);

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[^\d]+-)?(\d+)(?:\.(\d+))?$").expect("version pattern is valid")
});

/// A service version. A `None` component is the `ANY` wildcard.
///
/// Equality, hashing and ordering use the service, major and minor numbers;
/// implied versions only take part in compatibility checks.
#[derive(Clone)]
pub struct Version {
    service: Arc<str>,
    major: Option<u32>,
    minor: Option<u32>,
    implied: Vec<Version>,
}

impl Version {
    pub fn new(service: impl Into<Arc<str>>, major: Option<u32>, minor: Option<u32>) -> Self {
        Self {
            service: service.into(),
            major,
            minor,
            implied: Vec::new(),
        }
    }

    /// Parse `"2"`, `"2.1"` or `"gdata-2.1"` for `service`.
    pub fn parse(service: impl Into<Arc<str>>, description: &str) -> Result<Self, VersionParseError> {
        let caps = VERSION_RE
            .captures(description.trim())
            .ok_or_else(|| VersionParseError(description.to_string()))?;
        let number = |i: usize| -> Result<Option<u32>, VersionParseError> {
            caps.get(i)
                .map(|m| m.as_str().parse::<u32>())
                .transpose()
                .map_err(|_| VersionParseError(description.to_string()))
        };
        let major = number(1)?;
        let minor = number(2)?.or(Some(0));
        Ok(Self::new(service, major, minor))
    }

    /// A version that is also compatible with each of `implied`.
    pub fn with_implied(mut self, implied: impl IntoIterator<Item = Version>) -> Self {
        self.implied.extend(implied);
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn major(&self) -> Option<u32> {
        self.major
    }

    pub fn minor(&self) -> Option<u32> {
        self.minor
    }

    pub fn implied(&self) -> &[Version] {
        &self.implied
    }

    /// Same service and the same major version (either side may be `ANY`),
    /// or compatible through one of this version's implied versions.
    pub fn is_compatible(&self, other: &Version) -> bool {
        if self.service == other.service {
            match (self.major, other.major) {
                (None, _) | (_, None) => return true,
                (Some(a), Some(b)) if a == b => return true,
                _ => {}
            }
        }
        self.implied.iter().any(|v| v.is_compatible(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.service == other.service && self.major == other.major && self.minor == other.minor
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service.hash(state);
        self.major.hash(state);
        self.minor.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.service
            .cmp(&other.service)
            .then_with(|| self.major.cmp(&other.major))
            .then_with(|| self.minor.cmp(&other.minor))
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |p: Option<u32>| p.map_or_else(|| "*".to_string(), |n| n.to_string());
        write!(f, "{}-{}.{}", self.service, part(self.major), part(self.minor))
    }
}

/// Selector among context-specific metadata variants. Absent fields are
/// wildcards.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct MetadataContext {
    alt_format: Option<AltFormat>,
    projection: Option<Arc<str>>,
    version: Option<Version>,
}

impl MetadataContext {
    /// A context for the given parts, or `None` if every part is absent.
    pub fn for_context(
        alt_format: Option<AltFormat>,
        projection: Option<&str>,
        version: Option<Version>,
    ) -> Option<Self> {
        if alt_format.is_none() && projection.is_none() && version.is_none() {
            return None;
        }
        Some(Self {
            alt_format,
            projection: projection.map(Arc::from),
            version,
        })
    }

    pub fn for_alt_format(alt_format: AltFormat) -> Self {
        Self {
            alt_format: Some(alt_format),
            ..Self::default()
        }
    }

    pub fn for_projection(projection: &str) -> Self {
        Self {
            projection: Some(Arc::from(projection)),
            ..Self::default()
        }
    }

    pub fn for_version(version: Version) -> Self {
        Self {
            version: Some(version),
            ..Self::default()
        }
    }

    pub fn alt_format(&self) -> Option<&AltFormat> {
        self.alt_format.as_ref()
    }

    pub fn projection(&self) -> Option<&str> {
        self.projection.as_deref()
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// True if every part present on `self` is satisfied by `other`.
    ///
    /// A missing `other` satisfies only a context with no parts.
    pub fn matches(&self, other: Option<&MetadataContext>) -> bool {
        let empty = MetadataContext::default();
        let other = other.unwrap_or(&empty);
        if self.alt_format.is_some() && self.alt_format != other.alt_format {
            return false;
        }
        if self.projection.is_some() && self.projection != other.projection {
            return false;
        }
        match (&self.version, &other.version) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => theirs.is_compatible(mine),
        }
    }
}

impl PartialOrd for MetadataContext {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetadataContext {
    fn cmp(&self, other: &Self) -> Ordering {
        self.alt_format
            .cmp(&other.alt_format)
            .then_with(|| self.projection.cmp(&other.projection))
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl fmt::Display for MetadataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(alt) = &self.alt_format {
            parts.push(format!("alt={}", alt));
        }
        if let Some(projection) = &self.projection {
            parts.push(format!("projection={}", projection));
        }
        if let Some(version) = &self.version {
            parts.push(format!("version={}", version));
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_context_returns_none_when_empty() {
        assert!(MetadataContext::for_context(None, None, None).is_none());
        assert!(MetadataContext::for_context(None, Some("full"), None).is_some());
    }

    #[test]
    fn test_matches_requires_present_parts() {
        let rss = MetadataContext::for_alt_format(AltFormat::rss());
        let rss_full =
            MetadataContext::for_context(Some(AltFormat::rss()), Some("full"), None).unwrap();
        assert!(rss.matches(Some(&rss_full)));
        assert!(!rss_full.matches(Some(&rss)));
        assert!(!rss.matches(None));
        assert!(MetadataContext::default().matches(None));
    }

    #[test]
    fn test_version_compatibility() {
        let v1 = Version::parse("gdata", "1.0").unwrap();
        let v2 = Version::parse("gdata", "gdata-2.1").unwrap();
        let any = Version::new("gdata", None, None);
        assert!(!v1.is_compatible(&v2));
        assert!(any.is_compatible(&v2));
        assert!(v2.is_compatible(&any));
        assert_eq!(v2.minor(), Some(1));

        let implied = Version::parse("calendar", "2").unwrap().with_implied([v2.clone()]);
        assert!(implied.is_compatible(&v2));

        let ctx = MetadataContext::for_version(v1.clone());
        assert!(ctx.matches(Some(&MetadataContext::for_version(v1))));
        assert!(!ctx.matches(Some(&MetadataContext::for_version(v2))));
    }

    #[test]
    fn test_version_parse_rejects_garbage() {
        assert!(Version::parse("gdata", "two").is_err());
    }

    #[test]
    fn test_ordering_is_total() {
        let mut contexts = vec![
            MetadataContext::for_projection("full"),
            MetadataContext::for_alt_format(AltFormat::rss()),
            MetadataContext::for_alt_format(AltFormat::atom()),
        ];
        contexts.sort();
        assert_eq!(contexts[0].projection(), Some("full"));
        assert_eq!(contexts[1].alt_format(), Some(&AltFormat::atom()));
        assert_eq!(contexts[2].alt_format(), Some(&AltFormat::rss()));
    }
}
