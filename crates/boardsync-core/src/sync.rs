use crate::classify::CardIndex;
use crate::collector::collect_open_milestones;
use crate::config::BoardConfig;
use crate::error::{Result, SyncError};
use crate::github::Tracker;
use crate::reconcile::{CardPushStats, MilestonePushStats, Reconciler};
use crate::retry::{retry, RetryPolicy};
use crate::trello::{Card, CardStore, TrelloList};
use serde::Serialize;

// ---------------------------------------------------------------------------
// BoardReport
// ---------------------------------------------------------------------------

/// What one board's run found and wrote.
#[derive(Debug, Clone, Serialize)]
pub struct BoardReport {
    pub board: String,
    pub milestones: usize,
    pub linked_cards: usize,
    pub unlinked_cards: usize,
    pub creation_candidates: usize,
    pub milestone_push: MilestonePushStats,
    pub card_push: CardPushStats,
    pub closed_refreshed: u32,
    pub releases_rewritten: u32,
}

// ---------------------------------------------------------------------------
// Board run
// ---------------------------------------------------------------------------

/// Run one board's synchronization to completion: classify its cards,
/// collect open milestones, reconcile both directions, refresh cards whose
/// milestones closed, then roll up release counts over the updated card set.
///
/// Structural failures (board or intake list missing, collection failure
/// after retries) abort the board run; per-item creation failures are logged
/// inside the reconciler and reflected in the report.
pub fn synchronize_board(
    tracker: &dyn Tracker,
    store: &dyn CardStore,
    board: &BoardConfig,
    policy: RetryPolicy,
) -> Result<BoardReport> {
    tracing::info!(board = %board.name, "handling board");

    let found = retry(&policy, || store.find_board(&board.name))?
        .ok_or_else(|| SyncError::BoardNotFound(board.name.clone()))?;
    let lists = retry(&policy, || store.lists(&found.id))?;
    let intake = lists
        .iter()
        .find(|l| l.name == board.intake_list)
        .ok_or_else(|| SyncError::ListNotFound {
            board: board.name.clone(),
            list: board.intake_list.clone(),
        })?;

    let index = CardIndex::build(fetch_cards(store, &lists, &policy)?);
    tracing::info!(
        linked = index.linked.len(),
        unlinked = index.unlinked.len(),
        "classified cards"
    );

    let bucket = collect_open_milestones(tracker, &board.repos, &policy)?;

    let reconciler = Reconciler::new(tracker, store, policy);
    let milestone_push = reconciler.push_milestones_to_board(&bucket, &index.linked, &intake.id)?;
    let candidates = index.creation_candidates(&board.ignore_labels);
    let creation_candidates = candidates.len();
    let card_push = reconciler.push_cards_to_tracker(&candidates, &board.default_repo)?;
    let closed_refreshed = reconciler.refresh_closed_milestones(&bucket, &index.linked)?;

    // Re-read the board so the rollup sums post-update counts, including
    // cards created this run.
    let fresh = CardIndex::build(fetch_cards(store, &lists, &policy)?);
    let releases_rewritten = reconciler.rollup_release_counts(&fresh, &board.release_label)?;

    Ok(BoardReport {
        board: board.name.clone(),
        milestones: bucket.len(),
        linked_cards: index.linked.len(),
        unlinked_cards: index.unlinked.len(),
        creation_candidates,
        milestone_push,
        card_push,
        closed_refreshed,
        releases_rewritten,
    })
}

fn fetch_cards(
    store: &dyn CardStore,
    lists: &[TrelloList],
    policy: &RetryPolicy,
) -> Result<Vec<Card>> {
    let mut cards = Vec::new();
    for list in lists {
        cards.extend(retry(policy, || store.cards(&list.id))?);
    }
    Ok(cards)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::CardLink;
    use crate::testutil::{card, labelled, milestone, with_attachment, FakeStore, FakeTracker};
    use crate::trello::{GITHUB_API_LINK_LABEL, GITHUB_LINK_LABEL};

    fn board_config() -> BoardConfig {
        BoardConfig {
            name: "Product".into(),
            intake_list: "To Schedule".into(),
            repos: vec!["acme/widgets".parse().unwrap()],
            default_repo: "acme/widgets".parse().unwrap(),
            ignore_labels: vec!["Release".into(), "Key Date".into()],
            release_label: "Release".into(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::immediate(3)
    }

    #[test]
    fn missing_board_is_fatal() {
        let tracker = FakeTracker::default();
        let store = FakeStore::default(); // no boards at all
        let err = synchronize_board(&tracker, &store, &board_config(), policy()).unwrap_err();
        assert!(matches!(err, SyncError::BoardNotFound(_)));
    }

    #[test]
    fn missing_intake_list_is_fatal() {
        let tracker = FakeTracker::default();
        let mut store = FakeStore::with_cards(vec![]);
        store.lists[0].name = "Backlog".into();
        let err = synchronize_board(&tracker, &store, &board_config(), policy()).unwrap_err();
        assert!(matches!(err, SyncError::ListNotFound { .. }));
    }

    #[test]
    fn full_run_reconciles_both_directions() {
        // One milestone without a card, one candidate card without a
        // milestone, one release card rolling up a linked sub-card.
        let m = milestone("widgets", 1, "Beta", 2, 3);
        let tracker = FakeTracker::with_milestones(vec![m.clone()]);

        let linked_sub = with_attachment(
            with_attachment(card("s1", "[widgets] Sub (1/3)"), GITHUB_LINK_LABEL, &m.html_url),
            GITHUB_API_LINK_LABEL,
            &m.url,
        );
        let candidate = card("c1", "[widgets] New work");
        let release = with_attachment(
            labelled(card("r1", "Q1 Release"), &["Release"]),
            "",
            &linked_sub.url,
        );
        let store = FakeStore::with_cards(vec![linked_sub, candidate, release]);

        let report = synchronize_board(&tracker, &store, &board_config(), policy()).unwrap();

        assert_eq!(report.milestones, 1);
        assert_eq!(report.linked_cards, 1);
        assert_eq!(report.unlinked_cards, 2);
        assert_eq!(report.creation_candidates, 1);
        // The linked sub-card matched milestone 1 and had a stale count.
        assert_eq!(report.milestone_push.matched, 1);
        assert_eq!(report.milestone_push.count_updates, 1);
        // The candidate became a milestone.
        assert_eq!(report.card_push.created, 1);
        assert_eq!(tracker.creates.get(), 1);
        // Rollup ran over the updated card set: sub-card is now (2/5).
        assert_eq!(report.releases_rewritten, 1);
        assert_eq!(store.card_by_id("r1").unwrap().name, "Q1 Release (2/5)");

        // Candidate card is now fully linked.
        let c1 = store.card_by_id("c1").unwrap();
        assert_eq!(c1.attachments.len(), 2);
        let milestones = tracker.milestones.borrow();
        let created = milestones.iter().find(|m| m.title == "New work").unwrap();
        assert_eq!(
            CardLink::parse(created.description.as_deref().unwrap())
                .unwrap()
                .url,
            c1.url
        );
    }

    #[test]
    fn converged_board_issues_no_writes() {
        let mut m = milestone("widgets", 1, "Beta", 2, 3);
        m.description = Some(CardLink::append("", "https://trello.com/c/s1/1-card"));
        let tracker = FakeTracker::with_milestones(vec![m.clone()]);

        let linked = with_attachment(
            with_attachment(
                card("s1", "[widgets] Beta (2/5)"),
                GITHUB_LINK_LABEL,
                &m.html_url,
            ),
            GITHUB_API_LINK_LABEL,
            &m.url,
        );
        let store = FakeStore::with_cards(vec![linked]);

        synchronize_board(&tracker, &store, &board_config(), policy()).unwrap();
        assert_eq!(store.write_count(), 0);
        assert_eq!(tracker.write_count(), 0);
    }

    #[test]
    fn repeated_runs_converge_to_zero_writes() {
        let m = milestone("widgets", 1, "Beta", 2, 3);
        let tracker = FakeTracker::with_milestones(vec![m]);
        let store = FakeStore::with_cards(vec![card("c1", "[widgets] New work")]);
        let config = board_config();

        synchronize_board(&tracker, &store, &config, policy()).unwrap();
        synchronize_board(&tracker, &store, &config, policy()).unwrap();
        let store_writes = store.write_count();
        let tracker_writes = tracker.write_count();

        synchronize_board(&tracker, &store, &config, policy()).unwrap();
        assert_eq!(store.write_count(), store_writes);
        assert_eq!(tracker.write_count(), tracker_writes);
    }

    #[test]
    fn release_labelled_cards_are_not_candidates() {
        let tracker = FakeTracker::default();
        let release = labelled(card("r1", "[widgets] Big Release"), &["Release"]);
        let store = FakeStore::with_cards(vec![release]);

        let report = synchronize_board(&tracker, &store, &board_config(), policy()).unwrap();
        assert_eq!(report.creation_candidates, 0);
        assert_eq!(tracker.creates.get(), 0);
    }
}
