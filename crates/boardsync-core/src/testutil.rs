//! In-memory `Tracker` / `CardStore` fakes for engine tests. Writes are
//! applied to the stored state and counted, so idempotence tests can diff
//! write counts across runs.

use crate::error::{Result, SyncError};
use crate::github::{Milestone, MilestoneRef, MilestoneUpdate, RepoRef, Tracker};
use crate::trello::{Attachment, Board, Card, CardStore, Label, TrelloList};
use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};

pub fn milestone(repo: &str, number: u64, title: &str, closed: u32, open: u32) -> Milestone {
    Milestone {
        number,
        title: title.to_string(),
        description: Some(String::new()),
        due_on: None,
        closed_issues: closed,
        open_issues: open,
        html_url: format!("https://github.com/acme/{repo}/milestone/{number}"),
        url: format!("https://api.github.com/repos/acme/{repo}/milestones/{number}"),
    }
}

pub fn card(id: &str, name: &str) -> Card {
    Card {
        id: id.to_string(),
        name: name.to_string(),
        desc: String::new(),
        due: None,
        id_list: "l1".to_string(),
        url: format!("https://trello.com/c/{id}/1-card"),
        labels: Vec::new(),
        attachments: Vec::new(),
    }
}

pub fn labelled(mut c: Card, labels: &[&str]) -> Card {
    c.labels = labels
        .iter()
        .map(|l| Label {
            name: l.to_string(),
        })
        .collect();
    c
}

pub fn with_attachment(mut c: Card, label: &str, url: &str) -> Card {
    c.attachments.push(Attachment {
        name: label.to_string(),
        url: url.to_string(),
    });
    c
}

// ---------------------------------------------------------------------------
// FakeTracker
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeTracker {
    pub milestones: RefCell<Vec<Milestone>>,
    pub creates: Cell<u32>,
    pub updates: Cell<u32>,
    /// Fail this many upcoming create calls with a non-transient error.
    pub fail_creates: Cell<u32>,
}

impl FakeTracker {
    pub fn with_milestones(milestones: Vec<Milestone>) -> Self {
        Self {
            milestones: RefCell::new(milestones),
            ..Default::default()
        }
    }

    pub fn write_count(&self) -> u32 {
        self.creates.get() + self.updates.get()
    }
}

impl Tracker for FakeTracker {
    fn list_open_milestones(&self, repo: &RepoRef, _per_page: u32) -> Result<Vec<Milestone>> {
        let marker = format!("/repos/{}/{}/milestones/", repo.owner, repo.name);
        Ok(self
            .milestones
            .borrow()
            .iter()
            .filter(|m| m.url.contains(&marker))
            .cloned()
            .collect())
    }

    fn get_milestone(&self, mref: &MilestoneRef) -> Result<Milestone> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/milestones/{}",
            mref.repo.owner, mref.repo.name, mref.number
        );
        self.milestones
            .borrow()
            .iter()
            .find(|m| m.url == url)
            .cloned()
            .ok_or(SyncError::Api {
                service: "github",
                status: 404,
                message: "Not Found".into(),
            })
    }

    fn create_milestone(
        &self,
        repo: &RepoRef,
        title: &str,
        description: Option<&str>,
        due_on: Option<DateTime<Utc>>,
    ) -> Result<Milestone> {
        if self.fail_creates.get() > 0 {
            self.fail_creates.set(self.fail_creates.get() - 1);
            return Err(SyncError::Api {
                service: "github",
                status: 422,
                message: "validation failed".into(),
            });
        }
        let number = self.milestones.borrow().len() as u64 + 100;
        let mut m = milestone(&repo.name, number, title, 0, 0);
        m.description = description.map(str::to_string);
        m.due_on = due_on;
        self.milestones.borrow_mut().push(m.clone());
        self.creates.set(self.creates.get() + 1);
        Ok(m)
    }

    fn update_milestone(&self, mref: &MilestoneRef, update: &MilestoneUpdate) -> Result<Milestone> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/milestones/{}",
            mref.repo.owner, mref.repo.name, mref.number
        );
        let mut milestones = self.milestones.borrow_mut();
        let m = milestones
            .iter_mut()
            .find(|m| m.url == url)
            .ok_or(SyncError::Api {
                service: "github",
                status: 404,
                message: "Not Found".into(),
            })?;
        if let Some(desc) = &update.description {
            m.description = Some(desc.clone());
        }
        if let Some(due) = update.due_on {
            m.due_on = Some(due);
        }
        self.updates.set(self.updates.get() + 1);
        Ok(m.clone())
    }
}

// ---------------------------------------------------------------------------
// FakeStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeStore {
    pub boards: Vec<Board>,
    pub lists: Vec<TrelloList>,
    pub cards: RefCell<Vec<Card>>,
    pub creates: Cell<u32>,
    pub updates: Cell<u32>,
    pub attachment_writes: Cell<u32>,
    /// Fail this many upcoming create calls with a non-transient error.
    pub fail_creates: Cell<u32>,
    next_id: Cell<u32>,
}

impl FakeStore {
    pub fn with_cards(cards: Vec<Card>) -> Self {
        Self {
            boards: vec![Board {
                id: "b1".into(),
                name: "Product".into(),
            }],
            lists: vec![TrelloList {
                id: "l1".into(),
                name: "To Schedule".into(),
            }],
            cards: RefCell::new(cards),
            ..Default::default()
        }
    }

    pub fn write_count(&self) -> u32 {
        self.creates.get() + self.updates.get() + self.attachment_writes.get()
    }

    pub fn card_by_id(&self, id: &str) -> Option<Card> {
        self.cards.borrow().iter().find(|c| c.id == id).cloned()
    }
}

impl CardStore for FakeStore {
    fn find_board(&self, name: &str) -> Result<Option<Board>> {
        Ok(self.boards.iter().find(|b| b.name == name).cloned())
    }

    fn lists(&self, _board_id: &str) -> Result<Vec<TrelloList>> {
        Ok(self.lists.clone())
    }

    fn cards(&self, list_id: &str) -> Result<Vec<Card>> {
        Ok(self
            .cards
            .borrow()
            .iter()
            .filter(|c| c.id_list == list_id)
            .cloned()
            .collect())
    }

    fn get_card(&self, card_id: &str) -> Result<Card> {
        self.card_by_id(card_id).ok_or(SyncError::Api {
            service: "trello",
            status: 404,
            message: "card not found".into(),
        })
    }

    fn create_card(
        &self,
        list_id: &str,
        name: &str,
        desc: &str,
        due: Option<DateTime<Utc>>,
    ) -> Result<Card> {
        if self.fail_creates.get() > 0 {
            self.fail_creates.set(self.fail_creates.get() - 1);
            return Err(SyncError::Api {
                service: "trello",
                status: 400,
                message: "invalid value for name".into(),
            });
        }
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        let card = Card {
            id: format!("new{n}"),
            name: name.to_string(),
            desc: desc.to_string(),
            due,
            id_list: list_id.to_string(),
            url: format!("https://trello.com/c/new{n}/{n}-created"),
            labels: Vec::new(),
            attachments: Vec::new(),
        };
        self.cards.borrow_mut().push(card.clone());
        self.creates.set(self.creates.get() + 1);
        Ok(card)
    }

    fn update_card(&self, card: &Card) -> Result<()> {
        let mut cards = self.cards.borrow_mut();
        let stored = cards
            .iter_mut()
            .find(|c| c.id == card.id)
            .ok_or(SyncError::Api {
                service: "trello",
                status: 404,
                message: "card not found".into(),
            })?;
        stored.name = card.name.clone();
        stored.desc = card.desc.clone();
        stored.due = card.due;
        self.updates.set(self.updates.get() + 1);
        Ok(())
    }

    fn add_attachment(&self, card_id: &str, url: &str, name: &str) -> Result<()> {
        let mut cards = self.cards.borrow_mut();
        let stored = cards
            .iter_mut()
            .find(|c| c.id == card_id)
            .ok_or(SyncError::Api {
                service: "trello",
                status: 404,
                message: "card not found".into(),
            })?;
        stored.attachments.push(Attachment {
            name: name.to_string(),
            url: url.to_string(),
        });
        self.attachment_writes.set(self.attachment_writes.get() + 1);
        Ok(())
    }
}
