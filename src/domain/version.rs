use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use semver::{BuildMetadata, Prerelease, Version};

static LENIENT_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[vV]?([0-9]+)(?:\.([0-9]+))?(?:\.([0-9]+))?(?:-([0-9A-Za-z\-.]+))?(?:\+([0-9A-Za-z\-.]+))?$",
    )
    .expect("lenient version regex is valid")
});

/// Parse a tag as a semantic version, accepting the loose forms image
/// registries use in practice: a `v` prefix, missing minor/patch components
/// and leading zeros ("v2", "1.13-alpine", "18.04").
///
/// Returns `None` for tags that are not versions at all, such as "latest".
pub fn parse_lenient(tag: &str) -> Option<Version> {
    let caps = LENIENT_VERSION.captures(tag)?;

    let number = |i: usize| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse::<u64>().ok(),
            None => Some(0),
        }
    };

    let mut version = Version::new(number(1)?, number(2)?, number(3)?);
    if let Some(pre) = caps.get(4) {
        version.pre = Prerelease::new(pre.as_str()).ok()?;
    }
    if let Some(build) = caps.get(5) {
        version.build = BuildMetadata::new(build.as_str()).ok()?;
    }
    Some(version)
}

/// Compare two versions by semver precedence, ignoring build metadata.
pub fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// A registry tag that parsed as a version.
///
/// Keeps the literal spelling next to the parsed value so a winning
/// candidate is written back exactly as the registry publishes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagVersion {
    pub literal: String,
    pub version: Version,
}

impl TagVersion {
    /// Parse a tag, returning `None` when it is opaque
    pub fn parse(tag: &str) -> Option<Self> {
        parse_lenient(tag).map(|version| TagVersion {
            literal: tag.to_string(),
            version,
        })
    }

    /// Whether both tags name the same version, regardless of spelling
    pub fn same_version(&self, other: &TagVersion) -> bool {
        cmp_precedence(&self.version, &other.version) == Ordering::Equal
    }
}

impl fmt::Display for TagVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

/// Whether a tag is opaque, i.e. not parseable as a version
pub fn is_opaque_tag(tag: &str) -> bool {
    parse_lenient(tag).is_none()
}
