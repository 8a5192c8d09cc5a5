// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Route path patterns used by the access control list.
//!
//! Patterns and paths use `/` as the segment separator:
//! - `*` matches exactly one segment
//! - `**` matches zero or more segments
//!
//! Literal segments compare case-sensitively. `/docs/**/*` matches `/docs/x`
//! and `/docs/a/b/c` but not `/docs`.

use std::fmt;

/// Pattern compilation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern {0:?} must start with '/'")]
    MissingLeadingSlash(String),

    #[error("pattern {pattern:?} mixes a wildcard with literal text in segment {segment:?}")]
    MixedWildcard { pattern: String, segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`
    Single,
    /// `**`
    Multi,
}

/// Compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a pattern.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let Some(rest) = pattern.strip_prefix('/') else {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        };

        let mut segments = Vec::new();
        for segment in split_segments(rest) {
            let compiled = match segment {
                "*" => Segment::Single,
                "**" => Segment::Multi,
                s if s.contains('*') => {
                    return Err(PatternError::MixedWildcard {
                        pattern: pattern.to_string(),
                        segment: s.to_string(),
                    })
                }
                s => Segment::Literal(s.to_string()),
            };
            segments.push(compiled);
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    /// The pattern text as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check a request path against this pattern.
    ///
    /// Paths without a leading `/` never match.
    pub fn matches(&self, path: &str) -> bool {
        let Some(rest) = path.strip_prefix('/') else {
            return false;
        };
        let parts: Vec<&str> = split_segments(rest).collect();
        match_segments(&self.segments, &parts)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// `""` (the root path) has no segments.
fn split_segments(rest: &str) -> impl Iterator<Item = &str> {
    let empty = rest.is_empty();
    rest.split('/').filter(move |_| !empty)
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match (pattern.split_first(), path.split_first()) {
        (None, _) => path.is_empty(),
        // try every split point, shortest first
        (Some((Segment::Multi, tail)), _) => (0..=path.len()).any(|skip| match_segments(tail, &path[skip..])),
        (Some(_), None) => false,
        (Some((Segment::Single, tail)), Some((_, rest))) => match_segments(tail, rest),
        (Some((Segment::Literal(lit), tail)), Some((part, rest))) => lit == part && match_segments(tail, rest),
    }
}
