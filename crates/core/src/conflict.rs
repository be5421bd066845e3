use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// 1-based, inclusive line span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "line {}", self.start)
        } else {
            write!(f, "lines {}-{}", self.start, self.end)
        }
    }
}

/// A divergence between a pending local edit and an agent update that
/// both moved away from `base_version`. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub description: String,
    pub base_version: u64,
    pub user_content: String,
    pub ai_content: String,
    pub line_range: Option<LineRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    User,
    Ai,
    Merge,
}

impl ResolutionChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
            Self::Merge => "merge",
        }
    }
}

impl FromStr for ResolutionChoice {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "ai" => Ok(Self::Ai),
            "merge" => Ok(Self::Merge),
            _ => Err(CoreError::UnknownVariant {
                kind: "resolution choice",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ResolutionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span of lines where `a` and `b` diverge, measured against the longer of
/// the two. `None` when they are identical.
pub fn changed_line_range(a: &str, b: &str) -> Option<LineRange> {
    if a == b {
        return None;
    }
    let a_lines: Vec<&str> = a.split('\n').collect();
    let b_lines: Vec<&str> = b.split('\n').collect();

    let prefix = a_lines
        .iter()
        .zip(b_lines.iter())
        .take_while(|(x, y)| x == y)
        .count();

    let max_suffix = a_lines.len().min(b_lines.len()) - prefix;
    let suffix = a_lines
        .iter()
        .rev()
        .zip(b_lines.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();

    let start = prefix + 1;
    let end = (a_lines.len().max(b_lines.len()) - suffix).max(start);
    Some(LineRange::new(start, end))
}
