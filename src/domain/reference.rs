use std::ops::Range;

use regex::bytes::Regex;

use crate::error::{Result, UpdateTagsError};

/// Default pattern for pinned image references: `<repository>:<tag>@sha256:<hex>`.
///
/// Groups are repository, tag and digest, in that order. Word boundaries
/// keep it from matching inside unrelated text such as file paths.
pub const DEFAULT_PATTERN: &str =
    r"(?-u)\b([a-zA-Z0-9/.\-]+):([^@\s]+?)@(sha256:[[:xdigit:]]+)\b";

/// Capture groups every reference pattern must declare
pub const REFERENCE_GROUPS: usize = 3;

/// Index of the repository group
pub const REPOSITORY_GROUP: usize = 0;
/// Index of the tag group
pub const TAG_GROUP: usize = 1;
/// Index of the digest group
pub const DIGEST_GROUP: usize = 2;

/// A located match: byte offsets of the whole match and of each capture
/// group, in declaration order. Groups that did not participate are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub span: Range<usize>,
    pub groups: Vec<Option<Range<usize>>>,
}

impl Reference {
    /// Bytes of a capture group within `src`, empty if it did not participate
    pub fn group<'a>(&self, src: &'a [u8], index: usize) -> &'a [u8] {
        match self.groups.get(index).cloned().flatten() {
            Some(range) => &src[range],
            None => &[],
        }
    }
}

/// A compiled reference pattern with exactly three capture groups
#[derive(Debug, Clone)]
pub struct ReferencePattern {
    regex: Regex,
}

impl ReferencePattern {
    /// Compile a pattern, checking it captures repository, tag and digest
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| UpdateTagsError::pattern(e.to_string()))?;

        let groups = regex.captures_len() - 1;
        if groups != REFERENCE_GROUPS {
            return Err(UpdateTagsError::pattern(format!(
                "'{}' has {} capture groups, expected {} (repository, tag, digest)",
                pattern, groups, REFERENCE_GROUPS
            )));
        }

        if has_nested_capture(pattern) {
            return Err(UpdateTagsError::pattern(format!(
                "'{}' nests capture groups; repository, tag and digest must not overlap",
                pattern
            )));
        }

        Ok(ReferencePattern { regex })
    }

    /// The underlying byte regex
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Whether a capture group opens inside another capture group.
///
/// Scans the pattern source, skipping escapes and character classes.
/// Non-capturing groups (`(?:...)`, flag groups) do not count.
fn has_nested_capture(pattern: &str) -> bool {
    let mut open: Vec<bool> = Vec::new();
    let mut class_depth = 0usize;
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '[' => {
                class_depth += 1;
                if chars.peek() == Some(&'^') {
                    chars.next();
                }
                // a leading ']' is literal
                if chars.peek() == Some(&']') {
                    chars.next();
                }
            }
            ']' if class_depth > 0 => class_depth -= 1,
            _ if class_depth > 0 => {}
            '(' => {
                let capturing = if chars.peek() == Some(&'?') {
                    chars.next();
                    match chars.peek() {
                        Some('P') => true,
                        Some('<') => {
                            chars.next();
                            !matches!(chars.peek(), Some('=') | Some('!'))
                        }
                        _ => false,
                    }
                } else {
                    true
                };
                if capturing && open.iter().any(|&c| c) {
                    return true;
                }
                open.push(capturing);
            }
            ')' => {
                open.pop();
            }
            _ => {}
        }
    }

    false
}

impl Default for ReferencePattern {
    fn default() -> Self {
        ReferencePattern {
            regex: Regex::new(DEFAULT_PATTERN).expect("default reference pattern is valid"),
        }
    }
}
