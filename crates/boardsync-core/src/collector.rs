use crate::error::Result;
use crate::github::{Milestone, RepoRef, Tracker, MILESTONE_PAGE_SIZE};
use crate::retry::{retry, RetryPolicy};

// ---------------------------------------------------------------------------
// MilestoneBucket
// ---------------------------------------------------------------------------

/// One collection pass over the configured repositories: `(repo_name,
/// milestone)` pairs in repo iteration order, ascending milestone number
/// within each repo. Rebuilt every run, never mutated afterwards.
#[derive(Debug, Default)]
pub struct MilestoneBucket {
    entries: Vec<(String, Milestone)>,
}

impl MilestoneBucket {
    pub fn iter(&self) -> impl Iterator<Item = &(String, Milestone)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any collected milestone carries this canonical API URL.
    /// Used to detect cards whose milestone has since closed.
    pub fn contains_api_url(&self, url: &str) -> bool {
        self.entries.iter().any(|(_, m)| m.url == url)
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Gather open milestones across `repos`, each listing wrapped in bounded
/// retry. A repo whose listing still fails after retries aborts the run —
/// collection failure is fatal, not skippable.
pub fn collect_open_milestones(
    tracker: &dyn Tracker,
    repos: &[RepoRef],
    policy: &RetryPolicy,
) -> Result<MilestoneBucket> {
    let mut entries = Vec::new();
    for repo in repos {
        tracing::info!(repo = %repo, "checking repository");
        let mut milestones = retry(policy, || {
            tracker.list_open_milestones(repo, MILESTONE_PAGE_SIZE)
        })?;
        // Numeric ascending, not lexical.
        milestones.sort_by_key(|m| m.number);
        for milestone in milestones {
            entries.push((repo.name.clone(), milestone));
        }
    }
    tracing::info!(count = entries.len(), "collected open milestones");
    Ok(MilestoneBucket { entries })
}
