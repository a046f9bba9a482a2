use crate::output::print_json;
use anyhow::Context;
use boardsync_core::config::SyncConfig;
use boardsync_core::github::GithubTracker;
use boardsync_core::retry::RetryPolicy;
use boardsync_core::sync::{synchronize_board, BoardReport};
use boardsync_core::trello::TrelloStore;
use std::path::Path;

pub fn run(config_path: &Path, board: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = SyncConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let boards: Vec<_> = match board {
        Some(name) => vec![config
            .board(name)
            .with_context(|| format!("board '{name}' is not configured"))?],
        None => config.boards.iter().collect(),
    };

    let tracker = GithubTracker::new(config.github_token()?);
    let (key, token) = config.trello_credentials()?;
    let store = TrelloStore::new(key, token);
    let policy = RetryPolicy::default();

    // Boards run sequentially; one board's fatal failure doesn't stop the
    // others, but it does fail the batch.
    let mut reports = Vec::new();
    let mut failed = Vec::new();
    for board in boards {
        match synchronize_board(&tracker, &store, board, policy) {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::error!(board = %board.name, error = %e, "board synchronization failed");
                failed.push(board.name.clone());
            }
        }
    }

    if json {
        print_json(&reports)?;
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("synchronization failed for: {}", failed.join(", "));
    }
    Ok(())
}

fn print_report(r: &BoardReport) {
    println!("==> {}", r.board);
    println!(
        "    {} milestones: {} with cards, {} cards created ({} failed)",
        r.milestones, r.milestone_push.matched, r.milestone_push.created,
        r.milestone_push.create_failures
    );
    println!(
        "    {} cards updated, {} milestone due dates aligned",
        r.milestone_push.count_updates, r.milestone_push.date_updates
    );
    println!(
        "    {} candidate cards: {} milestones created ({} failed)",
        r.creation_candidates, r.card_push.created, r.card_push.failed
    );
    println!(
        "    {} closed milestones refreshed, {} release cards rewritten",
        r.closed_refreshed, r.releases_rewritten
    );
}
