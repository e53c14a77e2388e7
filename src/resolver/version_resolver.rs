use std::cmp::Ordering;

use crate::domain::version::{cmp_precedence, is_opaque_tag};
use crate::domain::{TagVersion, VersionConstraint};
use crate::error::{Result, UpdateTagsError};

/// Picks the replacement tag for an image reference
pub struct VersionResolver<'a> {
    repository: &'a str,
    constraint: Option<&'a VersionConstraint>,
    enforce: bool,
}

impl<'a> VersionResolver<'a> {
    /// Create a resolver for one repository
    ///
    /// With `enforce` set, opaque tags such as "latest" are replaced by the
    /// newest version satisfying the constraint instead of being kept.
    pub fn new(
        repository: &'a str,
        constraint: Option<&'a VersionConstraint>,
        enforce: bool,
    ) -> Self {
        VersionResolver {
            repository,
            constraint,
            enforce,
        }
    }

    /// Whether `original_tag` is kept as-is without looking at candidates.
    ///
    /// Opaque tags name channels ("latest", "insiders") rather than releases
    /// and are only retagged in enforce mode.
    pub fn keeps_tag(&self, original_tag: &str) -> bool {
        is_opaque_tag(original_tag) && !self.enforce
    }

    /// Resolve the tag an image reference should point at
    pub fn resolve(&self, original_tag: &str, candidates: &[String]) -> Result<String> {
        if self.keeps_tag(original_tag) {
            return Ok(original_tag.to_string());
        }
        self.latest(candidates)
    }

    /// Newest candidate satisfying the constraint, in its literal spelling.
    ///
    /// Unparseable candidates are skipped. Among candidates of equal
    /// precedence the first one listed wins.
    pub fn latest(&self, candidates: &[String]) -> Result<String> {
        let mut best: Option<TagVersion> = None;

        for candidate in candidates.iter().filter_map(|t| TagVersion::parse(t)) {
            if let Some(constraint) = self.constraint {
                if !constraint.matches(&candidate.version) {
                    continue;
                }
            }

            let newer = match &best {
                Some(current) => {
                    cmp_precedence(&candidate.version, &current.version) == Ordering::Greater
                }
                None => true,
            };
            if newer {
                best = Some(candidate);
            }
        }

        best.map(|tag| tag.literal)
            .ok_or_else(|| UpdateTagsError::NoMatchingVersion {
                repository: self.repository.to_string(),
                constraint: self.constraint.map(|c| c.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_opaque_tag_passes_through() {
        let resolver = VersionResolver::new("sourcegraph/server", None, false);
        let resolved = resolver
            .resolve("latest", &tags(&["1.0.0", "2.0.0"]))
            .unwrap();
        assert_eq!(resolved, "latest");
    }

    #[test]
    fn test_opaque_tag_passes_through_without_candidates() {
        let constraint = VersionConstraint::parse("<2").unwrap();
        let resolver = VersionResolver::new("sourcegraph/server", Some(&constraint), false);
        assert!(resolver.keeps_tag("insiders"));
        assert_eq!(resolver.resolve("insiders", &[]).unwrap(), "insiders");
    }

    #[test]
    fn test_enforce_retags_opaque_tag() {
        let constraint = VersionConstraint::parse("~3.19").unwrap();
        let resolver = VersionResolver::new("sourcegraph/frontend", Some(&constraint), true);
        assert!(!resolver.keeps_tag("insiders"));
        let resolved = resolver
            .resolve("insiders", &tags(&["3.18.0", "3.19.1", "3.19.2", "3.20.0"]))
            .unwrap();
        assert_eq!(resolved, "3.19.2");
    }

    #[test]
    fn test_constraint_filtering_skips_unparseable() {
        let constraint = VersionConstraint::parse("<2.0.0").unwrap();
        let resolver = VersionResolver::new("example/app", Some(&constraint), false);
        let resolved = resolver
            .resolve("1.0.0", &tags(&["1.0.0", "1.5.0", "2.0.0", "bogus"]))
            .unwrap();
        assert_eq!(resolved, "1.5.0");
    }

    #[test]
    fn test_no_match_names_constraint() {
        let constraint = VersionConstraint::parse(">2.0.0").unwrap();
        let resolver = VersionResolver::new("example/app", Some(&constraint), false);
        let err = resolver.resolve("1.0.0", &tags(&["1.0.0"])).unwrap_err();
        assert!(matches!(err, UpdateTagsError::NoMatchingVersion { .. }));
        let msg = err.to_string();
        assert!(msg.contains("example/app"));
        assert!(msg.contains(">2.0.0"));
    }

    #[test]
    fn test_no_semver_tags_at_all() {
        let resolver = VersionResolver::new("example/app", None, false);
        let err = resolver
            .resolve("1.0.0", &tags(&["latest", "edge"]))
            .unwrap_err();
        assert_eq!(err.to_string(), "no semver tags found for 'example/app'");
    }

    #[test]
    fn test_literal_preserved() {
        let resolver = VersionResolver::new("prom/prometheus", None, false);
        assert_eq!(resolver.resolve("v2", &tags(&["v2.16.0"])).unwrap(), "v2.16.0");
    }

    #[test]
    fn test_latest_without_constraint() {
        let resolver = VersionResolver::new("prom/prometheus", None, false);
        let resolved = resolver
            .resolve("v2.16.0", &tags(&["v2.16.0", "v2.17.0", "v2.9.0", "latest"]))
            .unwrap();
        assert_eq!(resolved, "v2.17.0");
    }

    #[test]
    fn test_prerelease_sorts_below_release() {
        let resolver = VersionResolver::new("example/app", None, false);
        let resolved = resolver
            .resolve("1.0.0", &tags(&["2.0.0-rc.1", "2.0.0", "2.0.0-beta"]))
            .unwrap();
        assert_eq!(resolved, "2.0.0");
    }

    #[test]
    fn test_tie_break_prefers_first_seen() {
        let resolver = VersionResolver::new("example/app", None, false);
        let resolved = resolver
            .resolve("1.0.0", &tags(&["1.0.0", "v1.2", "1.2.0", "1.2"]))
            .unwrap();
        assert_eq!(resolved, "v1.2");
    }

    #[test]
    fn test_numeric_not_lexical_ordering() {
        let resolver = VersionResolver::new("alpine", None, false);
        let resolved = resolver
            .resolve("3.9", &tags(&["3.9", "3.10", "3.11.2", "3.2"]))
            .unwrap();
        assert_eq!(resolved, "3.11.2");
    }

    #[test]
    fn test_leading_zero_tags_with_constraint() {
        let constraint = VersionConstraint::parse("<18.04").unwrap();
        let resolver = VersionResolver::new("ubuntu", Some(&constraint), false);
        let resolved = resolver
            .resolve("16.04", &tags(&["14.04", "16.04", "18.04", "20.04", "bionic"]))
            .unwrap();
        assert_eq!(resolved, "16.04");
    }
}
