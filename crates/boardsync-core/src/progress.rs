use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// IssueCount
// ---------------------------------------------------------------------------

/// Closed/total issue counts carried in a card title suffix, e.g. `(2/5)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCount {
    pub closed: u32,
    pub total: u32,
}

impl IssueCount {
    pub fn new(closed: u32, total: u32) -> Self {
        Self { closed, total }
    }
}

impl fmt::Display for IssueCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}/{})", self.closed, self.total)
    }
}

impl std::ops::Add for IssueCount {
    type Output = IssueCount;

    fn add(self, rhs: IssueCount) -> IssueCount {
        IssueCount {
            closed: self.closed + rhs.closed,
            total: self.total + rhs.total,
        }
    }
}

// ---------------------------------------------------------------------------
// Title suffix parse / rewrite
// ---------------------------------------------------------------------------

static SUFFIX_RE: OnceLock<Regex> = OnceLock::new();

fn suffix_re() -> &'static Regex {
    SUFFIX_RE.get_or_init(|| Regex::new(r"\((\d+)/(\d+)\)$").unwrap())
}

/// Parse a trailing `(closed/total)` suffix from a card title.
pub fn parse_suffix(title: &str) -> Option<IssueCount> {
    let caps = suffix_re().captures(title)?;
    let closed = caps[1].parse().ok()?;
    let total = caps[2].parse().ok()?;
    Some(IssueCount { closed, total })
}

/// Replace an existing `(closed/total)` suffix with `count`, or append one
/// after trimming trailing whitespace. The caller persists only when the
/// result differs from the original title.
pub fn apply_suffix(title: &str, count: IssueCount) -> String {
    if suffix_re().is_match(title) {
        suffix_re().replace(title, count.to_string()).into_owned()
    } else {
        format!("{} {}", title.trim_end(), count)
    }
}
