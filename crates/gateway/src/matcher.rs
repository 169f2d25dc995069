//! Mock route path patterns.
//!
//! A pattern is a `/`-separated list of segments. A segment is either a literal, a named
//! parameter (`:id` or `{id}`), or an optional named parameter (`:id?`). Parameters capture
//! exactly one non-empty path segment, percent-decoded. Literals are case-sensitive.
//! Empty segments are ignored on both sides, so `/a//b/` and `/a/b` are the same path.

use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Captured parameters. Optional parameters that did not match are present with `None`.
pub type PathParams = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("invalid parameter name in segment '{0}'")]
    InvalidName(String),
    #[error("unbalanced braces in segment '{0}'")]
    UnbalancedBrace(String),
    #[error("a parameter must span a whole segment: '{0}'")]
    MixedSegment(String),
    #[error("duplicate parameter '{0}'")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { name: String, optional: bool },
}

/// A compiled route path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

/// Canonical form of a route path: leading `/`, no trailing `/` except for the root.
#[must_use]
pub fn normalize_path(value: &str) -> String {
    let trimmed = value.trim();
    let with_slash = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    let stripped = with_slash.trim_end_matches('/');
    if stripped.is_empty() {
        "/".to_string()
    } else {
        stripped.to_string()
    }
}

/// Decode `%XX` escapes like `decodeURIComponent`, keeping malformed escapes verbatim.
#[must_use]
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2]))
        {
            out.push((hi << 4) | lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn is_valid_param_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

impl PathPattern {
    /// Compile a pattern.
    ///
    /// # Errors
    ///
    /// Returns an error for empty or non-`[A-Za-z0-9_]` parameter names, unbalanced braces,
    /// parameters sharing a segment with literal text, and repeated parameter names.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let source = normalize_path(pattern);
        let mut segments = Vec::new();
        let mut names = HashSet::new();

        for raw in source.split('/').filter(|s| !s.is_empty()) {
            let segment = parse_segment(raw)?;
            if let Segment::Param { name, .. } = &segment
                && !names.insert(name.clone())
            {
                return Err(PatternError::Duplicate(name.clone()));
            }
            segments.push(segment);
        }

        Ok(Self { source, segments })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Parameter names in pattern order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a request path, returning the captured parameters.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let normalized = normalize_path(path);
        let parts: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = PathParams::new();
        if self.match_from(0, &parts, 0, &mut params) {
            Some(params)
        } else {
            None
        }
    }

    fn match_from(
        &self,
        seg_idx: usize,
        parts: &[&str],
        part_idx: usize,
        params: &mut PathParams,
    ) -> bool {
        let Some(segment) = self.segments.get(seg_idx) else {
            return part_idx == parts.len();
        };

        match segment {
            Segment::Literal(literal) => parts.get(part_idx).is_some_and(|part| {
                (*part == literal.as_str() || percent_decode(part) == *literal)
                    && self.match_from(seg_idx + 1, parts, part_idx + 1, params)
            }),
            Segment::Param { name, optional } => {
                if let Some(part) = parts.get(part_idx) {
                    params.insert(name.clone(), Some(percent_decode(part)));
                    if self.match_from(seg_idx + 1, parts, part_idx + 1, params) {
                        return true;
                    }
                }
                if *optional {
                    params.insert(name.clone(), None);
                    if self.match_from(seg_idx + 1, parts, part_idx, params) {
                        return true;
                    }
                }
                params.remove(name);
                false
            }
        }
    }
}

fn parse_segment(raw: &str) -> Result<Segment, PatternError> {
    if let Some(rest) = raw.strip_prefix(':') {
        let (name, optional) = match rest.strip_suffix('?') {
            Some(name) => (name, true),
            None => (rest, false),
        };
        if !is_valid_param_name(name) {
            return Err(PatternError::InvalidName(raw.to_string()));
        }
        return Ok(Segment::Param {
            name: name.to_string(),
            optional,
        });
    }

    if let Some(rest) = raw.strip_prefix('{') {
        let Some(name) = rest.strip_suffix('}') else {
            return Err(if rest.contains('}') {
                PatternError::MixedSegment(raw.to_string())
            } else {
                PatternError::UnbalancedBrace(raw.to_string())
            });
        };
        if name.contains('{') || name.contains('}') {
            return Err(PatternError::UnbalancedBrace(raw.to_string()));
        }
        if !is_valid_param_name(name) {
            return Err(PatternError::InvalidName(raw.to_string()));
        }
        return Ok(Segment::Param {
            name: name.to_string(),
            optional: false,
        });
    }

    let opens = raw.matches('{').count();
    let closes = raw.matches('}').count();
    if opens != closes {
        return Err(PatternError::UnbalancedBrace(raw.to_string()));
    }
    if opens > 0 {
        return Err(PatternError::MixedSegment(raw.to_string()));
    }
    Ok(Segment::Literal(raw.to_string()))
}
