use crate::classify::{repo_name_from_title, strip_repo_prefix, LinkedCard};
use crate::collector::MilestoneBucket;
use crate::error::{Result, SyncError};
use crate::github::{CardLink, Milestone, MilestoneRef, MilestoneUpdate, RepoRef, Tracker};
use crate::progress::{apply_suffix, IssueCount};
use crate::retry::{retry, RetryPolicy};
use crate::text::truncate;
use crate::trello::{Card, CardStore, GITHUB_API_LINK_LABEL, GITHUB_LINK_LABEL};
use chrono::{DateTime, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Link resolver
// ---------------------------------------------------------------------------

/// Return the first linked card whose linkage URL equals the milestone's
/// human-facing URL. Exact string equality; no normalization, so trailing
/// slashes or case differences never match.
pub fn find_card<'a>(milestone: &Milestone, linked: &'a [LinkedCard]) -> Option<&'a LinkedCard> {
    linked.iter().find(|lc| lc.milestone_url == milestone.html_url)
}

/// Whether the card's due date should be pushed onto the milestone.
/// The card wins, and only when it has a value:
/// no card date means no update regardless of the milestone's date.
fn due_dates_differ(card_due: Option<DateTime<Utc>>, milestone_due: Option<DateTime<Utc>>) -> bool {
    match (card_due, milestone_due) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(c), Some(m)) => c.date_naive() != m.date_naive(),
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct MilestonePushStats {
    /// Milestones that already had a card.
    pub matched: u32,
    /// Cards created for unmatched milestones.
    pub created: u32,
    /// Card creations that failed and were skipped.
    pub create_failures: u32,
    /// Milestones whose due date was overwritten from the card.
    pub date_updates: u32,
    /// Cards whose progress suffix actually changed.
    pub count_updates: u32,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct CardPushStats {
    /// Milestones created from eligible cards.
    pub created: u32,
    /// Milestone creations that failed and were skipped.
    pub failed: u32,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<'a> {
    pub(crate) tracker: &'a dyn Tracker,
    pub(crate) store: &'a dyn CardStore,
    pub(crate) policy: RetryPolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(tracker: &'a dyn Tracker, store: &'a dyn CardStore, policy: RetryPolicy) -> Self {
        Self {
            tracker,
            store,
            policy,
        }
    }

    // -----------------------------------------------------------------------
    // Milestone → card
    // -----------------------------------------------------------------------

    /// For every collected milestone: update the matching card (date rule +
    /// progress rewrite) or create one in the intake list and back-link the
    /// milestone. Card-creation failure is logged and skipped; everything
    /// else propagates.
    pub fn push_milestones_to_board(
        &self,
        bucket: &MilestoneBucket,
        linked: &[LinkedCard],
        intake_list_id: &str,
    ) -> Result<MilestonePushStats> {
        tracing::info!("adding new milestones to the board, updating existing cards");
        let mut stats = MilestonePushStats::default();

        for (repo_name, milestone) in bucket.iter() {
            match find_card(milestone, linked) {
                Some(lc) => {
                    stats.matched += 1;
                    if due_dates_differ(lc.card.due, milestone.due_on) {
                        let mref = milestone.milestone_ref()?;
                        let update = MilestoneUpdate {
                            due_on: lc.card.due,
                            ..Default::default()
                        };
                        retry(&self.policy, || self.tracker.update_milestone(&mref, &update))?;
                        stats.date_updates += 1;
                    }
                    if self.update_card_count(&lc.card, milestone.issue_count())? {
                        stats.count_updates += 1;
                    }
                }
                None => {
                    let name = format!(
                        "[{}] {} {}",
                        repo_name.to_lowercase(),
                        milestone.title,
                        milestone.issue_count()
                    );
                    let desc = milestone.description.as_deref().unwrap_or_default();
                    let created = retry(&self.policy, || {
                        self.store.create_card(
                            intake_list_id,
                            &truncate(&name),
                            &truncate(desc),
                            milestone.due_on,
                        )
                    });
                    let card = match created {
                        Ok(card) => card,
                        Err(e) => {
                            tracing::warn!(milestone = %milestone.title, error = %e,
                                "failed to create card, skipping");
                            stats.create_failures += 1;
                            continue;
                        }
                    };
                    retry(&self.policy, || {
                        self.store
                            .add_attachment(&card.id, &milestone.html_url, GITHUB_LINK_LABEL)
                    })?;
                    retry(&self.policy, || {
                        self.store
                            .add_attachment(&card.id, &milestone.url, GITHUB_API_LINK_LABEL)
                    })?;
                    self.backlink_milestone(milestone, &card.url)?;
                    stats.created += 1;
                }
            }
        }

        tracing::info!(
            matched = stats.matched,
            created = stats.created,
            "milestone push done"
        );
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Card → milestone
    // -----------------------------------------------------------------------

    /// For every creation candidate: create a milestone in the repo named by
    /// the card's title prefix (owner taken from `default_repo`), back-link
    /// it, and attach both milestone URLs to the card. Creation failure is
    /// logged and skipped; the batch never aborts on it.
    pub fn push_cards_to_tracker(
        &self,
        candidates: &[&Card],
        default_repo: &RepoRef,
    ) -> Result<CardPushStats> {
        tracing::info!("adding new cards to the tracker");
        let mut stats = CardPushStats::default();

        for card in candidates {
            let repo_name = repo_name_from_title(&card.name);
            let repo = match repo_name {
                Some(name) => RepoRef::new(default_repo.owner.clone(), name),
                None => default_repo.clone(),
            };
            tracing::info!(repo = %repo, card = %card.name, "creating milestone from card");

            let title = strip_repo_prefix(&card.name);
            let created = retry(&self.policy, || {
                self.tracker
                    .create_milestone(&repo, title, Some(&card.desc), card.due)
            });
            let milestone = match created {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(card = %card.name, error = %e,
                        "failed to create milestone, skipping");
                    stats.failed += 1;
                    continue;
                }
            };

            self.backlink_milestone(&milestone, &card.url)?;
            retry(&self.policy, || {
                self.store
                    .add_attachment(&card.id, &milestone.html_url, GITHUB_LINK_LABEL)
            })?;
            retry(&self.policy, || {
                self.store
                    .add_attachment(&card.id, &milestone.url, GITHUB_API_LINK_LABEL)
            })?;

            if repo_name.is_none() {
                // Unattributed card: mark it with the placeholder count so
                // the next run picks it up as a regular linked card.
                let mut annotated = (*card).clone();
                annotated.name = apply_suffix(&annotated.name, IssueCount::new(0, 0));
                retry(&self.policy, || self.store.update_card(&annotated))?;
            }
            stats.created += 1;
        }

        tracing::info!(created = stats.created, failed = stats.failed, "card push done");
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Closed-milestone refresh
    // -----------------------------------------------------------------------

    /// Linked cards whose canonical API URL no longer appears among the open
    /// milestones reference a milestone that has closed since the last run.
    /// Fetch it directly and rewrite the card's suffix to the final counts.
    pub fn refresh_closed_milestones(
        &self,
        bucket: &MilestoneBucket,
        linked: &[LinkedCard],
    ) -> Result<u32> {
        tracing::info!("updating cards for closed milestones");
        let mut refreshed = 0;

        for lc in linked {
            let Some(api_url) = lc.milestone_api_url.as_deref() else {
                continue;
            };
            if bucket.contains_api_url(api_url) {
                continue;
            }
            let mref = match MilestoneRef::from_api_url(api_url) {
                Ok(mref) => mref,
                Err(e) => {
                    tracing::warn!(card = %lc.card.name, error = %e,
                        "unparseable milestone attachment, skipping");
                    continue;
                }
            };
            let milestone = match retry(&self.policy, || self.tracker.get_milestone(&mref)) {
                Ok(m) => m,
                Err(SyncError::Api { status: 404, .. }) => {
                    tracing::warn!(card = %lc.card.name, "milestone deleted upstream, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if self.update_card_count(&lc.card, milestone.issue_count())? {
                refreshed += 1;
            }
        }

        Ok(refreshed)
    }

    // -----------------------------------------------------------------------
    // Shared writes
    // -----------------------------------------------------------------------

    /// Rewrite the card's `(closed/total)` suffix. No write is issued when
    /// the computed title equals the current one.
    pub fn update_card_count(&self, card: &Card, count: IssueCount) -> Result<bool> {
        let new_name = apply_suffix(&card.name, count);
        if new_name == card.name {
            return Ok(false);
        }
        let mut updated = card.clone();
        updated.name = new_name;
        tracing::info!(card = %updated.name, "updating issue count");
        retry(&self.policy, || self.store.update_card(&updated))?;
        Ok(true)
    }

    /// Append the card link to the milestone description unless one is
    /// already there. Returns whether a write was issued.
    fn backlink_milestone(&self, milestone: &Milestone, card_url: &str) -> Result<bool> {
        let desc = milestone.description.as_deref().unwrap_or_default();
        if CardLink::parse(desc).is_some() {
            return Ok(false);
        }
        let mref = milestone.milestone_ref()?;
        let update = MilestoneUpdate {
            description: Some(CardLink::append(desc, card_url)),
            ..Default::default()
        };
        retry(&self.policy, || self.tracker.update_milestone(&mref, &update))?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
