use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const TRELLO_API_URL: &str = "https://api.trello.com/1";

/// Reserved attachment labels. A card carrying a `GitHub` attachment is
/// linked to the milestone behind that URL; the `GitHub API` attachment
/// holds the canonical API URL used for matching after the milestone closes.
pub const GITHUB_LINK_LABEL: &str = "GitHub";
pub const GITHUB_API_LINK_LABEL: &str = "GitHub API";

// ---------------------------------------------------------------------------
// Models (Trello wire shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloList {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub name: String,
}

/// A link record attached to a card; Trello calls the label `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(rename = "idList")]
    pub id_list: String,
    pub url: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Card {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.name == label)
    }

    pub fn attachment(&self, label: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.name == label)
    }

    /// Presence of the reserved-label attachment is the only linkage signal.
    pub fn is_linked(&self) -> bool {
        self.attachment(GITHUB_LINK_LABEL).is_some()
    }
}

// ---------------------------------------------------------------------------
// Card URL helpers
// ---------------------------------------------------------------------------

const CARD_URL_PREFIX: &str = "https://trello.com/c/";

static CARD_KEY_RE: OnceLock<Regex> = OnceLock::new();
static CARD_ID_RE: OnceLock<Regex> = OnceLock::new();

fn card_key_re() -> &'static Regex {
    CARD_KEY_RE.get_or_init(|| Regex::new(r"^(https://trello\.com/c/[^/]+/\d+)-").unwrap())
}

fn card_id_re() -> &'static Regex {
    CARD_ID_RE.get_or_init(|| Regex::new(r"^https://trello\.com/c/([^/]+)").unwrap())
}

/// Whether a URL points at a Trello card.
pub fn is_card_url(url: &str) -> bool {
    url.starts_with(CARD_URL_PREFIX)
}

/// Normalize a card URL by stripping the trailing human-readable slug:
/// `https://trello.com/c/abc123/12-some-card` → `https://trello.com/c/abc123/12`.
/// Two URLs with equal keys reference the same card.
pub fn card_url_key(url: &str) -> Option<&str> {
    card_key_re()
        .captures(url)
        .map(|caps| caps.get(1).unwrap().as_str())
}

/// Extract the short card id from a card URL.
pub fn card_id_from_url(url: &str) -> Option<&str> {
    card_id_re()
        .captures(url)
        .map(|caps| caps.get(1).unwrap().as_str())
}

// ---------------------------------------------------------------------------
// CardStore
// ---------------------------------------------------------------------------

/// Board-service capabilities the engine consumes.
pub trait CardStore {
    fn find_board(&self, name: &str) -> Result<Option<Board>>;
    fn lists(&self, board_id: &str) -> Result<Vec<TrelloList>>;
    fn cards(&self, list_id: &str) -> Result<Vec<Card>>;
    fn get_card(&self, card_id: &str) -> Result<Card>;
    fn create_card(
        &self,
        list_id: &str,
        name: &str,
        desc: &str,
        due: Option<DateTime<Utc>>,
    ) -> Result<Card>;
    /// Push a card's mutable fields (name, desc, due) back to the board.
    fn update_card(&self, card: &Card) -> Result<()>;
    fn add_attachment(&self, card_id: &str, url: &str, name: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// TrelloStore
// ---------------------------------------------------------------------------

const CARD_FIELDS: &str = "name,desc,due,idList,url,labels";

pub struct TrelloStore {
    http: reqwest::blocking::Client,
    base_url: String,
    key: String,
    token: String,
}

impl TrelloStore {
    pub fn new(key: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_base_url(key, token, TRELLO_API_URL)
    }

    pub fn with_base_url(
        key: impl Into<String>,
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("boardsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("default TLS backend available");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            token: token.into(),
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::blocking::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .query(&[("key", self.key.as_str()), ("token", self.token.as_str())])
    }

    fn check(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().unwrap_or_default();
        Err(SyncError::Api {
            service: "trello",
            status: status.as_u16(),
            message,
        })
    }
}

impl CardStore for TrelloStore {
    fn find_board(&self, name: &str) -> Result<Option<Board>> {
        let resp = self
            .request(reqwest::Method::GET, "/members/me/boards")
            .query(&[("fields", "name")])
            .send()?;
        let boards: Vec<Board> = Self::check(resp)?.json()?;
        Ok(boards.into_iter().find(|b| b.name == name))
    }

    fn lists(&self, board_id: &str) -> Result<Vec<TrelloList>> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/boards/{board_id}/lists"))
            .query(&[("fields", "name")])
            .send()?;
        Ok(Self::check(resp)?.json()?)
    }

    fn cards(&self, list_id: &str) -> Result<Vec<Card>> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/lists/{list_id}/cards"))
            .query(&[("fields", CARD_FIELDS), ("attachments", "true")])
            .send()?;
        Ok(Self::check(resp)?.json()?)
    }

    fn get_card(&self, card_id: &str) -> Result<Card> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/cards/{card_id}"))
            .query(&[("fields", CARD_FIELDS), ("attachments", "true")])
            .send()?;
        Ok(Self::check(resp)?.json()?)
    }

    fn create_card(
        &self,
        list_id: &str,
        name: &str,
        desc: &str,
        due: Option<DateTime<Utc>>,
    ) -> Result<Card> {
        let mut body = serde_json::json!({
            "idList": list_id,
            "name": name,
            "desc": desc,
        });
        if let Some(due) = due {
            body["due"] = serde_json::Value::from(due.to_rfc3339());
        }
        let resp = self
            .request(reqwest::Method::POST, "/cards")
            .json(&body)
            .send()?;
        Ok(Self::check(resp)?.json()?)
    }

    fn update_card(&self, card: &Card) -> Result<()> {
        let body = serde_json::json!({
            "name": card.name,
            "desc": card.desc,
            "due": card.due.map(|d| d.to_rfc3339()),
        });
        let resp = self
            .request(reqwest::Method::PUT, &format!("/cards/{}", card.id))
            .json(&body)
            .send()?;
        Self::check(resp)?;
        Ok(())
    }

    fn add_attachment(&self, card_id: &str, url: &str, name: &str) -> Result<()> {
        let body = serde_json::json!({ "url": url, "name": name });
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/cards/{card_id}/attachments"),
            )
            .json(&body)
            .send()?;
        Self::check(resp)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linkage_requires_reserved_label() {
        let card: Card = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "name": "Beta",
            "idList": "l1",
            "url": "https://trello.com/c/abc/1-beta",
            "attachments": [{"name": "Docs", "url": "https://example.com"}],
        }))
        .unwrap();
        assert!(!card.is_linked());

        let card: Card = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "name": "Beta",
            "idList": "l1",
            "url": "https://trello.com/c/abc/1-beta",
            "attachments": [
                {"name": "GitHub", "url": "https://github.com/acme/widgets/milestone/1"}
            ],
        }))
        .unwrap();
        assert!(card.is_linked());
        assert_eq!(
            card.attachment(GITHUB_LINK_LABEL).unwrap().url,
            "https://github.com/acme/widgets/milestone/1"
        );
    }

    #[test]
    fn card_url_key_strips_slug() {
        assert_eq!(
            card_url_key("https://trello.com/c/abc123/12-some-card-slug"),
            Some("https://trello.com/c/abc123/12")
        );
        assert_eq!(card_url_key("https://trello.com/c/abc123"), None);
        assert_eq!(card_url_key("https://example.com/c/abc123/12-x"), None);
    }

    #[test]
    fn card_id_from_url_takes_short_link() {
        assert_eq!(
            card_id_from_url("https://trello.com/c/abc123/12-some-card"),
            Some("abc123")
        );
        assert_eq!(card_id_from_url("https://example.com/x"), None);
    }

    #[test]
    fn find_board_filters_by_name() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/members/me/boards")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("key".into(), "k".into()),
                mockito::Matcher::UrlEncoded("token".into(), "t".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":"b1","name":"Ops"},{"id":"b2","name":"Product"}]"#)
            .create();

        let store = TrelloStore::with_base_url("k", "t", server.url());
        let board = store.find_board("Product").unwrap().unwrap();
        assert_eq!(board.id, "b2");
        assert!(store.find_board("Nope").unwrap().is_none());
    }

    #[test]
    fn cards_request_inlines_attachments() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/lists/l1/cards")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("attachments".into(), "true".into()),
                mockito::Matcher::UrlEncoded("fields".into(), CARD_FIELDS.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{
                    "id": "c1",
                    "name": "[widgets] Beta (1/4)",
                    "desc": "",
                    "due": "2024-01-05T00:00:00.000Z",
                    "idList": "l1",
                    "url": "https://trello.com/c/abc/1-beta",
                    "labels": [{"name": "Release"}],
                    "attachments": [
                        {"name": "GitHub", "url": "https://github.com/acme/widgets/milestone/1"}
                    ]
                }]"#,
            )
            .create();

        let store = TrelloStore::with_base_url("k", "t", server.url());
        let cards = store.cards("l1").unwrap();
        mock.assert();
        assert_eq!(cards.len(), 1);
        assert!(cards[0].has_label("Release"));
        assert!(cards[0].is_linked());
        assert!(cards[0].due.is_some());
    }

    #[test]
    fn create_card_posts_into_list() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/cards")
            .match_query(mockito::Matcher::Any)
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "idList": "l1",
                "name": "[widgets] Beta (0/4)",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "id": "c9",
                    "name": "[widgets] Beta (0/4)",
                    "desc": "d",
                    "idList": "l1",
                    "url": "https://trello.com/c/new/9-beta"
                }"#,
            )
            .create();

        let store = TrelloStore::with_base_url("k", "t", server.url());
        let card = store
            .create_card("l1", "[widgets] Beta (0/4)", "d", None)
            .unwrap();
        mock.assert();
        assert_eq!(card.id, "c9");
    }

    #[test]
    fn rate_limit_maps_to_transient_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/cards/c1")
            .with_status(429)
            .with_body("rate limited")
            .create();

        let store = TrelloStore::with_base_url("k", "t", server.url());
        let err = store.get_card("c1").unwrap_err();
        assert!(err.is_transient());
    }
}
