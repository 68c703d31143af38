//! Maven version parsing, comparison, and range matching.
//!
//! Maven versions use a custom ordering that differs from semver:
//! - Segments are split on `.`, `-`, and digit/letter boundaries
//! - Numeric segments compare as numbers
//! - Known qualifiers order
//!   `alpha` < `beta` < `milestone` < `rc` < `snapshot` < `""` (release) < `sp`
//! - Unknown qualifiers compare lexicographically and sort above numerics
//! - Trailing zero segments are equal to their prefix (`1.0` == `1.0.0`)

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A parsed Maven version with comparable segments.
#[derive(Debug, Clone)]
pub struct Version {
    pub original: String,
    segments: Vec<Segment>,
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.original)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Version::parse(&s))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Trailing release-equivalent segments must not affect equality
        let mut trimmed: &[Segment] = &self.segments;
        while let Some(last) = trimmed.last() {
            if compare_segment_to_empty(last) == Ordering::Equal {
                trimmed = &trimmed[..trimmed.len() - 1];
            } else {
                break;
            }
        }
        trimmed.hash(state);
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
enum Segment {
    Numeric(u64),
    Qualifier(QualifierKind),
    Text(String),
}

/// Well-known Maven qualifiers with defined ordering.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
enum QualifierKind {
    Alpha,
    Beta,
    Milestone,
    Rc,
    Snapshot,
    Release,
    Sp,
}

impl Version {
    pub fn parse(version: &str) -> Self {
        let segments = parse_segments(version);
        Self {
            original: version.to_string(),
            segments,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.original.ends_with("-SNAPSHOT")
    }

    /// The base version without the `-SNAPSHOT` suffix.
    pub fn base_version(&self) -> &str {
        self.original
            .strip_suffix("-SNAPSHOT")
            .unwrap_or(&self.original)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let max_len = self.segments.len().max(other.segments.len());
        for i in 0..max_len {
            let a = self.segments.get(i);
            let b = other.segments.get(i);
            let ord = compare_segments(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_segments(a: Option<&Segment>, b: Option<&Segment>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(s), None) => compare_segment_to_empty(s),
        (None, Some(s)) => compare_segment_to_empty(s).reverse(),
        (Some(a), Some(b)) => compare_two_segments(a, b),
    }
}

fn compare_segment_to_empty(seg: &Segment) -> Ordering {
    match seg {
        Segment::Numeric(0) => Ordering::Equal,
        Segment::Numeric(_) => Ordering::Greater,
        Segment::Qualifier(q) => q.cmp(&QualifierKind::Release),
        Segment::Text(s) if s.is_empty() => Ordering::Equal,
        Segment::Text(_) => Ordering::Greater,
    }
}

/// Rank for cross-kind comparison: pre-release qualifiers sort below release,
/// numerics above, unknown text above any numeric.
fn kind_rank(seg: &Segment) -> u8 {
    match seg {
        Segment::Qualifier(_) => 0,
        Segment::Numeric(_) => 1,
        Segment::Text(_) => 2,
    }
}

fn compare_two_segments(a: &Segment, b: &Segment) -> Ordering {
    match (a, b) {
        (Segment::Numeric(a), Segment::Numeric(b)) => a.cmp(b),
        (Segment::Qualifier(a), Segment::Qualifier(b)) => a.cmp(b),
        (Segment::Text(a), Segment::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

fn parse_segments(version: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, segments: &mut Vec<Segment>| {
        if !current.is_empty() {
            segments.push(classify(current));
            current.clear();
        }
    };

    for ch in version.chars() {
        if ch == '.' || ch == '-' {
            flush(&mut current, &mut segments);
        } else {
            // Split on transitions between digit and non-digit runs
            if let Some(last) = current.chars().last() {
                if last.is_ascii_digit() != ch.is_ascii_digit() {
                    flush(&mut current, &mut segments);
                }
            }
            current.push(ch);
        }
    }
    flush(&mut current, &mut segments);

    segments
}

fn classify(token: &str) -> Segment {
    if let Ok(n) = token.parse::<u64>() {
        return Segment::Numeric(n);
    }
    match token.to_lowercase().as_str() {
        "alpha" | "a" => Segment::Qualifier(QualifierKind::Alpha),
        "beta" | "b" => Segment::Qualifier(QualifierKind::Beta),
        "milestone" | "m" => Segment::Qualifier(QualifierKind::Milestone),
        "rc" | "cr" => Segment::Qualifier(QualifierKind::Rc),
        "snapshot" => Segment::Qualifier(QualifierKind::Snapshot),
        "" | "ga" | "final" | "release" => Segment::Qualifier(QualifierKind::Release),
        "sp" => Segment::Qualifier(QualifierKind::Sp),
        _ => Segment::Text(token.to_string()),
    }
}

/// One interval of a Maven version range.
///
/// `[1.0,2.0)`, `[1.0,]`, `(,2.0)`, and `[1.0]` (exact) are all intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

impl Interval {
    /// Check if a version falls within this interval.
    pub fn contains(&self, version: &Version) -> bool {
        if let Some(ref lower) = self.lower {
            let cmp = version.cmp(&lower.version);
            if lower.inclusive {
                if cmp == Ordering::Less {
                    return false;
                }
            } else if cmp != Ordering::Greater {
                return false;
            }
        }
        if let Some(ref upper) = self.upper {
            let cmp = version.cmp(&upper.version);
            if upper.inclusive {
                if cmp == Ordering::Greater {
                    return false;
                }
            } else if cmp != Ordering::Less {
                return false;
            }
        }
        true
    }

    fn parse_one(s: &str) -> Option<Self> {
        let open_inclusive = s.starts_with('[');
        let close_inclusive = s.ends_with(']');
        if !s.starts_with('[') && !s.starts_with('(') {
            return None;
        }
        if !s.ends_with(']') && !s.ends_with(')') {
            return None;
        }
        let inner = &s[1..s.len() - 1];

        if let Some((lower, upper)) = inner.split_once(',') {
            let lower = lower.trim();
            let upper = upper.trim();
            Some(Interval {
                lower: if lower.is_empty() {
                    None
                } else {
                    Some(Bound {
                        version: Version::parse(lower),
                        inclusive: open_inclusive,
                    })
                },
                upper: if upper.is_empty() {
                    None
                } else {
                    Some(Bound {
                        version: Version::parse(upper),
                        inclusive: close_inclusive,
                    })
                },
            })
        } else {
            // Exact pin: [1.0] means exactly 1.0
            if !open_inclusive || !close_inclusive {
                return None;
            }
            let v = Version::parse(inner.trim());
            Some(Interval {
                lower: Some(Bound {
                    version: v.clone(),
                    inclusive: true,
                }),
                upper: Some(Bound {
                    version: v,
                    inclusive: true,
                }),
            })
        }
    }
}

/// A version constraint as written in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionConstraint {
    /// A bare version: preferred, but reconciliation may override it.
    Soft(Version),
    /// `[1.0]`: exactly this version.
    Exact(Version),
    /// A union of one or more intervals, e.g. `[1,2),[3,4)`.
    Range(Vec<Interval>),
    /// The `latest`/`LATEST` symbolic token.
    Latest,
    /// The `release`/`RELEASE` symbolic token.
    Release,
}

impl VersionConstraint {
    /// Parse a version constraint string. Never fails: anything that is not
    /// range syntax or a symbolic token is a soft requirement.
    pub fn parse(spec: &str) -> Self {
        let s = spec.trim();
        match s {
            "latest" | "LATEST" => return Self::Latest,
            "release" | "RELEASE" => return Self::Release,
            _ => {}
        }
        if !s.starts_with('[') && !s.starts_with('(') {
            return Self::Soft(Version::parse(s));
        }

        let intervals = split_intervals(s)
            .into_iter()
            .map(|part| Interval::parse_one(&part))
            .collect::<Option<Vec<_>>>();
        match intervals {
            Some(intervals) if !intervals.is_empty() => {
                // A single exact pin keeps its stronger meaning
                if intervals.len() == 1 {
                    let iv = &intervals[0];
                    if let (Some(lo), Some(hi)) = (&iv.lower, &iv.upper) {
                        if lo.inclusive && hi.inclusive && lo.version == hi.version {
                            return Self::Exact(lo.version.clone());
                        }
                    }
                }
                Self::Range(intervals)
            }
            _ => Self::Soft(Version::parse(s)),
        }
    }

    /// Whether a concrete version satisfies this constraint.
    ///
    /// Symbolic tokens match nothing here; they are resolved against a
    /// repository version listing first.
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Soft(_) => true,
            Self::Exact(v) => v == version,
            Self::Range(intervals) => intervals.iter().any(|i| i.contains(version)),
            Self::Latest | Self::Release => false,
        }
    }

    /// The version this constraint prefers when no listing is consulted.
    pub fn preferred(&self) -> Option<&Version> {
        match self {
            Self::Soft(v) | Self::Exact(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this constraint needs a repository version listing to resolve.
    pub fn needs_listing(&self) -> bool {
        matches!(self, Self::Latest | Self::Release | Self::Range(_))
    }

    /// Pick the best candidate out of a version listing: the highest version
    /// matching the constraint. `Release` skips snapshots.
    pub fn select<'a>(&self, candidates: impl Iterator<Item = &'a Version>) -> Option<&'a Version> {
        match self {
            Self::Latest => candidates.max(),
            Self::Release => candidates.filter(|v| !v.is_snapshot()).max(),
            _ => candidates.filter(|v| self.matches(v)).max(),
        }
    }
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Soft(v) => write!(f, "{v}"),
            Self::Exact(v) => write!(f, "[{v}]"),
            Self::Range(intervals) => {
                for (i, iv) in intervals.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    let (open, close) = (
                        if iv.lower.as_ref().is_some_and(|b| b.inclusive) {
                            '['
                        } else {
                            '('
                        },
                        if iv.upper.as_ref().is_some_and(|b| b.inclusive) {
                            ']'
                        } else {
                            ')'
                        },
                    );
                    let lo = iv
                        .lower
                        .as_ref()
                        .map(|b| b.version.to_string())
                        .unwrap_or_default();
                    let hi = iv
                        .upper
                        .as_ref()
                        .map(|b| b.version.to_string())
                        .unwrap_or_default();
                    write!(f, "{open}{lo},{hi}{close}")?;
                }
                Ok(())
            }
            Self::Latest => f.write_str("latest"),
            Self::Release => f.write_str("release"),
        }
    }
}

/// Split a union constraint into bracketed interval substrings.
///
/// `[1,2),[3,4)` splits after every closing bracket that is followed
/// by a comma.
fn split_intervals(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in s.chars() {
        match ch {
            '[' | '(' => {
                depth += 1;
                current.push(ch);
            }
            ']' | ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}
