//! Capture-group aware replacement over byte buffers
//!
//! `regex` can replace whole matches, but not individual capture groups while
//! keeping the bytes between them. [`replace_all_submatch`] fills that gap:
//! the callback sees every match's groups and may replace any of them, and
//! everything it does not touch is copied through byte for byte.

use std::borrow::Cow;

use regex::bytes::Regex;

use crate::domain::Reference;

/// Capture-group values of one match, handed to the rewrite callback.
///
/// Every slot starts out borrowing the original bytes. Slots that are
/// never [`set`](Groups::set) are spliced back unchanged.
#[derive(Debug)]
pub struct Groups<'a> {
    values: Vec<Cow<'a, [u8]>>,
}

impl<'a> Groups<'a> {
    fn new(values: Vec<&'a [u8]>) -> Self {
        Groups {
            values: values.into_iter().map(Cow::Borrowed).collect(),
        }
    }

    /// Number of capture groups
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Current value of a group
    ///
    /// # Panics
    /// If `index` is not below [`len`](Groups::len).
    pub fn get(&self, index: usize) -> &[u8] {
        &self.values[index]
    }

    /// Replace the value of a group
    ///
    /// # Panics
    /// If `index` is not below [`len`](Groups::len).
    pub fn set(&mut self, index: usize, value: impl Into<Vec<u8>>) {
        self.values[index] = Cow::Owned(value.into());
    }

    /// Whether a group still holds its original bytes
    pub fn is_unchanged(&self, index: usize) -> bool {
        matches!(self.values[index], Cow::Borrowed(_))
    }
}

/// Locate every non-overlapping match of `re` in `src`, left to right.
pub fn find_references(re: &Regex, src: &[u8]) -> Vec<Reference> {
    re.captures_iter(src)
        .map(|caps| {
            let whole = caps.get(0).expect("group 0 always participates");
            Reference {
                span: whole.range(),
                groups: caps.iter().skip(1).map(|g| g.map(|m| m.range())).collect(),
            }
        })
        .collect()
}

/// Replace capture groups of every match of `re` in `src`.
///
/// `repl` is invoked once per match, in scan order, with that match's groups.
/// Bytes outside matches, and bytes inside a match that no group captured
/// (separators such as `:` and `@`), are copied as-is. A group that did not
/// participate in the match has no position, so replacing it has no effect.
/// Groups are spliced in position order; a group that starts inside one
/// already spliced (a nested group) is left to its enclosing group.
///
/// The first error returned by `repl` stops the rewrite and is returned;
/// no partially rewritten buffer is produced.
pub fn replace_all_submatch<E, F>(re: &Regex, src: &[u8], mut repl: F) -> Result<Vec<u8>, E>
where
    F: FnMut(&mut Groups<'_>) -> Result<(), E>,
{
    let mut result = Vec::with_capacity(src.len());
    let mut last = 0;

    for reference in find_references(re, src) {
        // Bytes between the previous match and this one
        result.extend_from_slice(&src[last..reference.span.start]);
        last = reference.span.end;

        let originals = (0..reference.groups.len())
            .map(|i| reference.group(src, i))
            .collect();
        let mut groups = Groups::new(originals);
        repl(&mut groups)?;

        let mut spliced: Vec<_> = reference
            .groups
            .iter()
            .zip(groups.values.iter())
            .filter_map(|(range, value)| range.clone().map(|range| (range, value)))
            .collect();
        spliced.sort_by_key(|(range, _)| range.start);

        let mut last_group = reference.span.start;
        for (range, value) in spliced {
            if range.start < last_group {
                // nested in or overlapping a group already written
                continue;
            }
            result.extend_from_slice(&src[last_group..range.start]);
            result.extend_from_slice(value);
            last_group = range.end;
        }
        result.extend_from_slice(&src[last_group..reference.span.end]);
    }

    result.extend_from_slice(&src[last..]);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reference::DEFAULT_PATTERN;
    use std::convert::Infallible;

    fn reference_regex() -> Regex {
        Regex::new(DEFAULT_PATTERN).unwrap()
    }

    #[test]
    fn test_unchanged_groups_round_trip() {
        let re = reference_regex();
        let src = b"FROM a/b:1.0@sha256:abc AS x\r\n  image: c:latest@sha256:def\n\ttrailing";
        let out = replace_all_submatch(&re, src, |_| Ok::<_, Infallible>(())).unwrap();
        assert_eq!(out, src.to_vec());
    }

    #[test]
    fn test_setting_original_value_is_byte_identical() {
        let re = reference_regex();
        let src = b"x a/b:1.0@sha256:abc y";
        let out = replace_all_submatch(&re, src, |groups| {
            let tag = groups.get(1).to_vec();
            groups.set(1, tag);
            Ok::<_, Infallible>(())
        })
        .unwrap();
        assert_eq!(out, src.to_vec());
    }

    #[test]
    fn test_group_isolation() {
        let re = reference_regex();
        let src = b"FROM prom/prometheus:v2.16.0@sha256:aaaa AS upstream";
        let out = replace_all_submatch(&re, src, |groups| {
            groups.set(1, "v2.17.0-longer-tag");
            Ok::<_, Infallible>(())
        })
        .unwrap();
        assert_eq!(
            out,
            b"FROM prom/prometheus:v2.17.0-longer-tag@sha256:aaaa AS upstream".to_vec()
        );
    }

    #[test]
    fn test_replace_multiple_groups_and_matches() {
        let re = reference_regex();
        let src = b"a:1@sha256:01\nb:2@sha256:02\n";
        let mut seen = Vec::new();
        let out = replace_all_submatch(&re, src, |groups| {
            seen.push(String::from_utf8_lossy(groups.get(0)).into_owned());
            groups.set(1, "9");
            groups.set(2, "sha256:ff");
            Ok::<_, Infallible>(())
        })
        .unwrap();
        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(out, b"a:9@sha256:ff\nb:9@sha256:ff\n".to_vec());
    }

    #[test]
    fn test_shorter_replacement() {
        let re = reference_regex();
        let src = b"img:1.0.0-rc.1@sha256:abcdef;";
        let out = replace_all_submatch(&re, src, |groups| {
            groups.set(1, "1");
            Ok::<_, Infallible>(())
        })
        .unwrap();
        assert_eq!(out, b"img:1@sha256:abcdef;".to_vec());
    }

    #[test]
    fn test_no_matches_returns_input() {
        let re = reference_regex();
        let src = br#"import("foo/bar")"#;
        let mut calls = 0;
        let out = replace_all_submatch(&re, src, |_| {
            calls += 1;
            Ok::<_, Infallible>(())
        })
        .unwrap();
        assert_eq!(calls, 0);
        assert_eq!(out, src.to_vec());
    }

    #[test]
    fn test_error_stops_rewrite() {
        let re = reference_regex();
        let src = b"a:1@sha256:01 b:2@sha256:02 c:3@sha256:03";
        let mut calls = 0;
        let result = replace_all_submatch(&re, src, |groups| {
            calls += 1;
            if groups.get(0) == b"b" {
                return Err("lookup failed");
            }
            Ok(())
        });
        assert_eq!(result, Err("lookup failed"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_non_utf8_bytes_preserved() {
        let re = reference_regex();
        let mut src = vec![0xff, 0xfe, b' '];
        src.extend_from_slice(b"a:1@sha256:01 ");
        src.push(0x80);
        let out = replace_all_submatch(&re, &src, |groups| {
            groups.set(1, "2");
            Ok::<_, Infallible>(())
        })
        .unwrap();
        let mut expected = vec![0xff, 0xfe, b' '];
        expected.extend_from_slice(b"a:2@sha256:01 ");
        expected.push(0x80);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_optional_group_not_participating() {
        let re = Regex::new(r"(\w+)(?:=(\w+))?;").unwrap();
        let src = b"a=1; b; c=3;";
        let out = replace_all_submatch(&re, src, |groups| {
            groups.set(1, "X");
            Ok::<_, Infallible>(())
        })
        .unwrap();
        assert_eq!(out, b"a=X; b; c=X;".to_vec());
    }

    #[test]
    fn test_nested_group_does_not_split_its_parent() {
        let re = Regex::new(r"([a-z/]+(:[^@\s]+))@(sha256:[0-9a-f]+)").unwrap();
        let src = b"FROM prom/prometheus:v2.16.0@sha256:aaaa AS upstream";
        let out = replace_all_submatch(&re, src, |groups| {
            groups.set(1, ":v2.17.0");
            Ok::<_, Infallible>(())
        })
        .unwrap();
        assert_eq!(out, src.to_vec());

        let out = replace_all_submatch(&re, src, |groups| {
            groups.set(0, "prom/alertmanager:v0.20.0");
            groups.set(2, "sha256:bbbb");
            Ok::<_, Infallible>(())
        })
        .unwrap();
        assert_eq!(
            out,
            b"FROM prom/alertmanager:v0.20.0@sha256:bbbb AS upstream".to_vec()
        );
    }

    #[test]
    fn test_groups_out_of_pattern_order() {
        // the last repetition captures "b" before "a"
        let re = Regex::new(r"(?:(a)|(b))+;").unwrap();
        let src = b"x ba; y";
        let out = replace_all_submatch(&re, src, |groups| {
            groups.set(0, "A");
            groups.set(1, "B");
            Ok::<_, Infallible>(())
        })
        .unwrap();
        assert_eq!(out, b"x BA; y".to_vec());
    }

    #[test]
    fn test_find_references_offsets() {
        let re = reference_regex();
        let src = b"FROM a:1@sha256:ab\n";
        let refs = find_references(&re, src);
        assert_eq!(refs.len(), 1);
        let r = &refs[0];
        assert_eq!(r.span, 5..18);
        assert_eq!(r.groups, vec![Some(5..6), Some(7..8), Some(9..18)]);
    }

    #[test]
    fn test_groups_tracks_changes() {
        let mut groups = Groups::new(vec![&b"a"[..], &b"b"[..]]);
        assert_eq!(groups.len(), 2);
        assert!(groups.is_unchanged(0));
        groups.set(0, "z");
        assert!(!groups.is_unchanged(0));
        assert_eq!(groups.get(0), b"z");
        assert!(groups.is_unchanged(1));
    }
}
