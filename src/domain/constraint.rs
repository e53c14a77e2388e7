//! Version constraint expressions
//!
//! Accepts the range syntax commonly used in image pinning flags:
//! `<18.04`, `~3.19`, `>= 1.2, < 3`, `^2 || ~1.9`, `1.2 - 1.4.5`, `!=1.3.0`.
//! Comparators inside an alternative are ANDed (commas or whitespace),
//! alternatives are ORed with `||`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use semver::{Version, VersionReq};

use crate::error::{Result, UpdateTagsError};

static HYPHEN_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\s+-\s+(\S+)$").expect("hyphen range regex is valid"));

static COMPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(!=|>=|<=|~>|=|>|<|~|\^)?\s*[vV]?(\S+)$").expect("comparator regex is valid")
});

static OPERATOR_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(!=|>=|<=|~>|=|>|<|~|\^)$").expect("operator regex is valid"));

/// A predicate over semantic versions, keeping the text it was parsed from.
#[derive(Debug, Clone)]
pub struct VersionConstraint {
    raw: String,
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone)]
struct Alternative {
    req: VersionReq,
    excluded: Vec<VersionReq>,
}

impl Alternative {
    fn matches(&self, version: &Version) -> bool {
        self.req.matches(version) && !self.excluded.iter().any(|e| e.matches(version))
    }
}

impl VersionConstraint {
    /// Parse a constraint expression
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(UpdateTagsError::constraint(raw, "constraint is empty"));
        }

        let alternatives = trimmed
            .split("||")
            .map(|alt| parse_alternative(raw, alt.trim()))
            .collect::<Result<Vec<_>>>()?;

        Ok(VersionConstraint {
            raw: trimmed.to_string(),
            alternatives,
        })
    }

    /// Check whether a version satisfies the constraint
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|alt| alt.matches(version))
    }

    /// The constraint as the user wrote it
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for VersionConstraint {
    type Err = UpdateTagsError;

    fn from_str(s: &str) -> Result<Self> {
        VersionConstraint::parse(s)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_alternative(raw: &str, alt: &str) -> Result<Alternative> {
    if alt.is_empty() {
        return Err(UpdateTagsError::constraint(raw, "empty alternative around '||'"));
    }

    let tokens = if let Some(caps) = HYPHEN_RANGE.captures(alt) {
        vec![format!(">={}", &caps[1]), format!("<={}", &caps[2])]
    } else {
        comparator_tokens(alt)
    };

    let mut comparators = Vec::new();
    let mut excluded = Vec::new();

    for token in &tokens {
        let caps = COMPARATOR
            .captures(token)
            .ok_or_else(|| UpdateTagsError::constraint(raw, format!("bad comparator '{}'", token)))?;
        let op = caps.get(1).map(|m| m.as_str()).unwrap_or("=");
        let version = normalize_version(&caps[2])
            .ok_or_else(|| UpdateTagsError::constraint(raw, format!("bad version '{}'", &caps[2])))?;

        match op {
            "!=" => excluded.push(parse_req(raw, &format!("={}", version))?),
            _ if version == "*" => {}
            "~>" => comparators.push(format!("~{}", version)),
            _ => comparators.push(format!("{}{}", op, version)),
        }
    }

    let req = if comparators.is_empty() {
        VersionReq::STAR
    } else {
        parse_req(raw, &comparators.join(", "))?
    };

    Ok(Alternative { req, excluded })
}

/// Split an alternative into comparator tokens, gluing a bare operator to
/// the version that follows it ("> 1.2" -> ">1.2").
fn comparator_tokens(alt: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut pending_op: Option<&str> = None;

    for word in alt.split(|c: char| c == ',' || c.is_whitespace()) {
        if word.is_empty() {
            continue;
        }
        if OPERATOR_ONLY.is_match(word) {
            pending_op = Some(word);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{}{}", op, word)),
            None => tokens.push(word.to_string()),
        }
    }

    if let Some(op) = pending_op {
        // a dangling operator is reported by the comparator parser
        tokens.push(op.to_string());
    }

    tokens
}

/// Normalize the version part of a comparator.
///
/// Leading zeros are stripped from numeric components. A wildcard component
/// (`x`, `X`, `*`) truncates the version, since a partial version already
/// ranges over everything below it ("1.2.x" -> "1.2"). A fully wildcarded
/// version becomes `*`.
fn normalize_version(version: &str) -> Option<String> {
    let split_at = version.find(['-', '+']).unwrap_or(version.len());
    let (core, suffix) = version.split_at(split_at);

    let components: Vec<&str> = core.split('.').collect();
    if components.len() > 3 {
        return None;
    }

    let mut parts = Vec::new();
    let mut truncated = false;
    for part in components {
        match part {
            "x" | "X" | "*" => {
                truncated = true;
                break;
            }
            _ => parts.push(part.parse::<u64>().ok()?.to_string()),
        }
    }

    if parts.is_empty() {
        return Some("*".to_string());
    }
    if truncated {
        return Some(parts.join("."));
    }

    Some(format!("{}{}", parts.join("."), suffix))
}

fn parse_req(raw: &str, req: &str) -> Result<VersionReq> {
    VersionReq::parse(req).map_err(|e| UpdateTagsError::constraint(raw, e.to_string()))
}
