use crate::classify::{CardIndex, LinkedCard};
use crate::error::{Result, SyncError};
use crate::progress::{parse_suffix, IssueCount};
use crate::reconcile::Reconciler;
use crate::retry::retry;
use crate::trello::{card_id_from_url, card_url_key, is_card_url, Card, CardStore};

impl Reconciler<'_> {
    /// For each release card, sum the `(closed/total)` suffixes of its
    /// sub-cards and rewrite the release card's own suffix. All-or-nothing:
    /// a release card with an unresolvable sub-card or an unparseable suffix
    /// is skipped for this run, never partially aggregated.
    pub fn rollup_release_counts(&self, index: &CardIndex, release_label: &str) -> Result<u32> {
        tracing::info!("updating release card issue counts");
        let mut rewritten = 0;

        for card in index.release_cards(release_label) {
            let sub_urls: Vec<&str> = card
                .attachments
                .iter()
                .filter(|a| is_card_url(&a.url))
                .map(|a| a.url.as_str())
                .collect();
            tracing::info!(release = %card.name, sub_cards = sub_urls.len(), "rolling up");
            if sub_urls.is_empty() {
                continue;
            }

            let mut sum = IssueCount::new(0, 0);
            let mut complete = true;
            for url in sub_urls {
                let count = self
                    .resolve_sub_card(&index.linked, url)?
                    .as_ref()
                    .and_then(|sub| parse_suffix(&sub.name));
                match count {
                    Some(count) => sum = sum + count,
                    None => {
                        tracing::warn!(release = %card.name, sub_card = url,
                            "sub-card without a progress count, skipping release card");
                        complete = false;
                        break;
                    }
                }
            }

            if complete && self.update_card_count(card, sum)? {
                rewritten += 1;
            }
        }

        Ok(rewritten)
    }

    /// Resolve a sub-card attachment URL to a card: prefer the already
    /// fetched linked set (matching on the slug-stripped URL key, so a
    /// renamed card still matches), fall back to a by-id fetch. `None` when
    /// the reference cannot be resolved at all.
    fn resolve_sub_card(&self, linked: &[LinkedCard], url: &str) -> Result<Option<Card>> {
        if let Some(key) = card_url_key(url) {
            let local = linked
                .iter()
                .find(|lc| card_url_key(&lc.card.url) == Some(key));
            if let Some(lc) = local {
                return Ok(Some(lc.card.clone()));
            }
        }
        let Some(card_id) = card_id_from_url(url) else {
            return Ok(None);
        };
        match retry(&self.policy, || self.store.get_card(card_id)) {
            Ok(card) => Ok(Some(card)),
            Err(SyncError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
