//! Topic pattern resolution against broker metadata.
//!
//! BABAMUL topics follow the convention
//! `<namespace>.<survey-origin>.<cross-match-status>.<classification>`,
//! e.g. `babamul.ztf.lsst-match.hosted`. A pattern is matched segment by
//! segment on the dot-delimited name: `*` matches exactly one segment,
//! so a pattern can only ever match topics with the same segment count.

use crate::babamul::error::BabamulError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard,
}

/// A parsed topic pattern, literal or wildcard-segmented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Parse a dot-separated pattern. Empty patterns and empty segments
    /// are rejected: they are invariably typos, and a pattern that can
    /// never match anything should fail loudly at construction.
    pub fn parse(pattern: &str) -> Result<Self, BabamulError> {
        if pattern.is_empty() {
            return Err(BabamulError::Configuration(
                "topic pattern must not be empty".to_string(),
            ));
        }
        let mut segments = Vec::new();
        for segment in pattern.split('.') {
            match segment {
                "" => {
                    return Err(BabamulError::Configuration(format!(
                        "topic pattern '{}' contains an empty segment",
                        pattern
                    )));
                }
                "*" => segments.push(Segment::Wildcard),
                literal => segments.push(Segment::Literal(literal.to_string())),
            }
        }
        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this pattern matches a concrete topic name. Segment
    /// counts must agree; there is no any-depth wildcard.
    pub fn matches(&self, topic: &str) -> bool {
        let mut count = 0;
        for (i, part) in topic.split('.').enumerate() {
            count = i + 1;
            match self.segments.get(i) {
                Some(Segment::Wildcard) => {}
                Some(Segment::Literal(lit)) if lit == part => {}
                _ => return false,
            }
        }
        count == self.segments.len()
    }
}

impl std::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Expand a pattern set against the topics currently known to the
/// broker. A topic is kept if any pattern matches it; the returned
/// order is the order topics first appeared in `known_topics`, so
/// diagnostics stay reproducible.
///
/// Resolving to nothing is a hard error: a misspelled pattern must not
/// turn into a silently empty stream.
pub fn resolve_topics<'a>(
    patterns: &[TopicPattern],
    known_topics: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<String>, BabamulError> {
    let mut resolved: Vec<String> = Vec::new();
    for topic in known_topics {
        if resolved.iter().any(|t| t == topic) {
            continue;
        }
        if patterns.iter().any(|p| p.matches(topic)) {
            resolved.push(topic.to_string());
        }
    }
    if resolved.is_empty() {
        return Err(BabamulError::NoMatchingTopics {
            patterns: patterns.iter().map(|p| p.raw.clone()).collect(),
        });
    }
    Ok(resolved)
}
