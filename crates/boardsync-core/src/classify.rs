use crate::trello::{Card, GITHUB_API_LINK_LABEL, GITHUB_LINK_LABEL};
use regex::Regex;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Title naming convention
// ---------------------------------------------------------------------------

static REPO_PREFIX_RE: OnceLock<Regex> = OnceLock::new();

fn repo_prefix_re() -> &'static Regex {
    REPO_PREFIX_RE.get_or_init(|| Regex::new(r"^\[([^\]]+)\]\s?").unwrap())
}

/// Extract the repository name from a `[repo-name] ...` card title.
pub fn repo_name_from_title(title: &str) -> Option<&str> {
    repo_prefix_re()
        .captures(title)
        .map(|caps| caps.get(1).unwrap().as_str())
}

/// Drop the `[repo-name] ` prefix, leaving the bare title.
pub fn strip_repo_prefix(title: &str) -> &str {
    match repo_prefix_re().find(title) {
        Some(m) => &title[m.end()..],
        None => title,
    }
}

// ---------------------------------------------------------------------------
// CardIndex
// ---------------------------------------------------------------------------

/// A card already associated with a milestone, with its linkage URLs pulled
/// out of the reserved-label attachments.
#[derive(Debug, Clone)]
pub struct LinkedCard {
    pub card: Card,
    /// Human-facing milestone URL (`GitHub` attachment) — the matching key
    /// for the link resolver.
    pub milestone_url: String,
    /// Canonical API URL (`GitHub API` attachment), when recorded.
    pub milestone_api_url: Option<String>,
}

/// In-memory partition of a board's cards, rebuilt every run and only read.
#[derive(Debug, Default)]
pub struct CardIndex {
    pub linked: Vec<LinkedCard>,
    pub unlinked: Vec<Card>,
}

impl CardIndex {
    /// Pure partition by reserved-label attachment presence. No external
    /// calls; attachments were inlined at fetch time.
    pub fn build(cards: Vec<Card>) -> Self {
        let mut index = CardIndex::default();
        for card in cards {
            match card.attachment(GITHUB_LINK_LABEL) {
                Some(link) => {
                    let milestone_url = link.url.clone();
                    let milestone_api_url =
                        card.attachment(GITHUB_API_LINK_LABEL).map(|a| a.url.clone());
                    index.linked.push(LinkedCard {
                        card,
                        milestone_url,
                        milestone_api_url,
                    });
                }
                None => index.unlinked.push(card),
            }
        }
        index
    }

    /// Unlinked cards eligible to generate a milestone: titled by the
    /// `[repo]` convention and carrying none of the ignore labels.
    pub fn creation_candidates(&self, ignore_labels: &[String]) -> Vec<&Card> {
        self.unlinked
            .iter()
            .filter(|card| repo_name_from_title(&card.name).is_some())
            .filter(|card| !ignore_labels.iter().any(|label| card.has_label(label)))
            .collect()
    }

    /// Unlinked cards labelled as composite releases.
    pub fn release_cards(&self, release_label: &str) -> Vec<&Card> {
        self.unlinked
            .iter()
            .filter(|card| card.has_label(release_label))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
