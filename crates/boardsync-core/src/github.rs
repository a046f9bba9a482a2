use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Milestone listing page size; repos with more open milestones than this
/// are not expected.
pub const MILESTONE_PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// RepoRef
// ---------------------------------------------------------------------------

/// An `owner/name` repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl std::str::FromStr for RepoRef {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(RepoRef::new(owner, name))
            }
            _ => Err(SyncError::Config(format!(
                "invalid repository reference '{s}': expected owner/name"
            ))),
        }
    }
}

impl TryFrom<String> for RepoRef {
    type Error = SyncError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<RepoRef> for String {
    fn from(r: RepoRef) -> String {
        r.to_string()
    }
}

// ---------------------------------------------------------------------------
// MilestoneRef
// ---------------------------------------------------------------------------

static API_URL_RE: OnceLock<Regex> = OnceLock::new();

fn api_url_re() -> &'static Regex {
    API_URL_RE.get_or_init(|| Regex::new(r"/repos/([^/]+)/([^/]+)/milestones/(\d+)$").unwrap())
}

/// A milestone's identity recovered from its canonical API URL
/// (`.../repos/{owner}/{repo}/milestones/{number}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneRef {
    pub repo: RepoRef,
    pub number: u64,
}

impl MilestoneRef {
    pub fn from_api_url(url: &str) -> Result<Self> {
        let caps = api_url_re()
            .captures(url)
            .ok_or_else(|| SyncError::MalformedMilestoneUrl(url.to_string()))?;
        let number = caps[3]
            .parse()
            .map_err(|_| SyncError::MalformedMilestoneUrl(url.to_string()))?;
        Ok(Self {
            repo: RepoRef::new(&caps[1], &caps[2]),
            number,
        })
    }
}

// ---------------------------------------------------------------------------
// Milestone
// ---------------------------------------------------------------------------

/// An open GitHub milestone, in the tracker's wire shape. `url` is the
/// canonical API URL and the sole cross-store matching key; `html_url` is the
/// human-facing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_on: Option<DateTime<Utc>>,
    pub closed_issues: u32,
    pub open_issues: u32,
    pub html_url: String,
    pub url: String,
}

impl Milestone {
    pub fn issue_count(&self) -> crate::progress::IssueCount {
        crate::progress::IssueCount::new(self.closed_issues, self.closed_issues + self.open_issues)
    }

    /// Identity parsed from the canonical API URL.
    pub fn milestone_ref(&self) -> Result<MilestoneRef> {
        MilestoneRef::from_api_url(&self.url)
    }
}

// ---------------------------------------------------------------------------
// Back-link guard
// ---------------------------------------------------------------------------

pub const CARD_LINK_LABEL: &str = "Trello Card";

/// Marker left by earlier tooling; still recognized so old descriptions are
/// never double-linked.
const LEGACY_CARD_MARKER: &str = "[Added by trello]";

static CARD_LINK_RE: OnceLock<Regex> = OnceLock::new();

fn card_link_re() -> &'static Regex {
    CARD_LINK_RE.get_or_init(|| Regex::new(r"\[Trello Card\]\(([^)]*)\)").unwrap())
}

/// The markdown card link embedded in a milestone description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLink {
    pub url: String,
}

impl CardLink {
    /// Parse the card link out of a milestone description, if present.
    /// A bare legacy marker counts as linked even without a URL.
    pub fn parse(description: &str) -> Option<CardLink> {
        if let Some(caps) = card_link_re().captures(description) {
            return Some(CardLink {
                url: caps[1].to_string(),
            });
        }
        if description.contains(LEGACY_CARD_MARKER) {
            return Some(CardLink { url: String::new() });
        }
        None
    }

    /// Append a card link to `description`. Callers check `parse` first;
    /// the link is written at most once per milestone.
    pub fn append(description: &str, url: &str) -> String {
        format!("{description}\n\n\n[{CARD_LINK_LABEL}]({url})")
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Fields pushed through the tracker's milestone update operation. Absent
/// fields are left untouched server-side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MilestoneUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_on: Option<DateTime<Utc>>,
}

/// Issue-tracker capabilities the engine consumes.
pub trait Tracker {
    fn list_open_milestones(&self, repo: &RepoRef, per_page: u32) -> Result<Vec<Milestone>>;
    fn get_milestone(&self, mref: &MilestoneRef) -> Result<Milestone>;
    fn create_milestone(
        &self,
        repo: &RepoRef,
        title: &str,
        description: Option<&str>,
        due_on: Option<DateTime<Utc>>,
    ) -> Result<Milestone>;
    fn update_milestone(&self, mref: &MilestoneRef, update: &MilestoneUpdate) -> Result<Milestone>;
}

// ---------------------------------------------------------------------------
// GithubTracker
// ---------------------------------------------------------------------------

pub struct GithubTracker {
    http: reqwest::blocking::Client,
    base_url: String,
    token: String,
}

impl GithubTracker {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, GITHUB_API_URL)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("boardsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("default TLS backend available");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
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
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
    }

    fn check(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().unwrap_or_default();
        Err(SyncError::Api {
            service: "github",
            status: status.as_u16(),
            message,
        })
    }
}

impl Tracker for GithubTracker {
    fn list_open_milestones(&self, repo: &RepoRef, per_page: u32) -> Result<Vec<Milestone>> {
        let path = format!("/repos/{}/{}/milestones", repo.owner, repo.name);
        let per_page = per_page.to_string();
        let resp = self
            .request(reqwest::Method::GET, &path)
            .query(&[("state", "open"), ("per_page", per_page.as_str())])
            .send()?;
        Ok(Self::check(resp)?.json()?)
    }

    fn get_milestone(&self, mref: &MilestoneRef) -> Result<Milestone> {
        let path = format!(
            "/repos/{}/{}/milestones/{}",
            mref.repo.owner, mref.repo.name, mref.number
        );
        let resp = self.request(reqwest::Method::GET, &path).send()?;
        Ok(Self::check(resp)?.json()?)
    }

    fn create_milestone(
        &self,
        repo: &RepoRef,
        title: &str,
        description: Option<&str>,
        due_on: Option<DateTime<Utc>>,
    ) -> Result<Milestone> {
        let path = format!("/repos/{}/{}/milestones", repo.owner, repo.name);
        let mut body = serde_json::json!({ "title": title });
        if let Some(desc) = description {
            body["description"] = serde_json::Value::from(desc);
        }
        if let Some(due) = due_on {
            body["due_on"] = serde_json::Value::from(due.to_rfc3339());
        }
        let resp = self.request(reqwest::Method::POST, &path).json(&body).send()?;
        Ok(Self::check(resp)?.json()?)
    }

    fn update_milestone(&self, mref: &MilestoneRef, update: &MilestoneUpdate) -> Result<Milestone> {
        let path = format!(
            "/repos/{}/{}/milestones/{}",
            mref.repo.owner, mref.repo.name, mref.number
        );
        let resp = self
            .request(reqwest::Method::PATCH, &path)
            .json(update)
            .send()?;
        Ok(Self::check(resp)?.json()?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn milestone_json(number: u64) -> String {
        format!(
            r#"{{
                "number": {number},
                "title": "Beta launch",
                "description": "ship it",
                "due_on": "2024-01-06T00:00:00Z",
                "closed_issues": 2,
                "open_issues": 3,
                "html_url": "https://github.com/acme/widgets/milestone/{number}",
                "url": "https://api.github.com/repos/acme/widgets/milestones/{number}"
            }}"#
        )
    }

    #[test]
    fn repo_ref_parses_owner_and_name() {
        let r: RepoRef = "acme/widgets".parse().unwrap();
        assert_eq!(r.owner, "acme");
        assert_eq!(r.name, "widgets");
        assert_eq!(r.to_string(), "acme/widgets");
    }

    #[test]
    fn repo_ref_rejects_malformed() {
        assert!("acme".parse::<RepoRef>().is_err());
        assert!("acme/".parse::<RepoRef>().is_err());
        assert!("/widgets".parse::<RepoRef>().is_err());
        assert!("a/b/c".parse::<RepoRef>().is_err());
    }

    #[test]
    fn milestone_ref_from_api_url() {
        let mref =
            MilestoneRef::from_api_url("https://api.github.com/repos/acme/widgets/milestones/7")
                .unwrap();
        assert_eq!(mref.repo, RepoRef::new("acme", "widgets"));
        assert_eq!(mref.number, 7);
    }

    #[test]
    fn milestone_ref_rejects_non_milestone_url() {
        assert!(MilestoneRef::from_api_url("https://api.github.com/repos/acme/widgets").is_err());
        assert!(MilestoneRef::from_api_url("https://trello.com/c/abc/12-card").is_err());
    }

    #[test]
    fn issue_count_totals_open_and_closed() {
        let m: Milestone = serde_json::from_str(&milestone_json(7)).unwrap();
        assert_eq!(m.issue_count(), crate::progress::IssueCount::new(2, 5));
    }

    #[test]
    fn card_link_parse_and_append() {
        assert_eq!(CardLink::parse("plain description"), None);

        let desc = CardLink::append("plain description", "https://trello.com/c/abc/12-beta");
        let link = CardLink::parse(&desc).unwrap();
        assert_eq!(link.url, "https://trello.com/c/abc/12-beta");
    }

    #[test]
    fn card_link_recognizes_legacy_marker() {
        assert!(CardLink::parse("body\n[Added by trello]").is_some());
    }

    #[test]
    fn list_open_milestones_hits_expected_endpoint() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/repos/acme/widgets/milestones")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("state".into(), "open".into()),
                mockito::Matcher::UrlEncoded("per_page".into(), "100".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!("[{}]", milestone_json(7)))
            .create();

        let tracker = GithubTracker::with_base_url("tok", server.url());
        let milestones = tracker
            .list_open_milestones(&RepoRef::new("acme", "widgets"), MILESTONE_PAGE_SIZE)
            .unwrap();
        mock.assert();
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].number, 7);
    }

    #[test]
    fn create_milestone_posts_fields() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/repos/acme/widgets/milestones")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "title": "Beta launch",
                "description": "ship it",
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(milestone_json(8))
            .create();

        let tracker = GithubTracker::with_base_url("tok", server.url());
        let m = tracker
            .create_milestone(
                &RepoRef::new("acme", "widgets"),
                "Beta launch",
                Some("ship it"),
                None,
            )
            .unwrap();
        mock.assert();
        assert_eq!(m.number, 8);
    }

    #[test]
    fn update_milestone_patches_only_set_fields() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("PATCH", "/repos/acme/widgets/milestones/7")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"due_on": "2024-01-05T00:00:00Z"}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(milestone_json(7))
            .create();

        let tracker = GithubTracker::with_base_url("tok", server.url());
        let mref = MilestoneRef {
            repo: RepoRef::new("acme", "widgets"),
            number: 7,
        };
        let update = MilestoneUpdate {
            due_on: Some("2024-01-05T00:00:00Z".parse().unwrap()),
            ..Default::default()
        };
        tracker.update_milestone(&mref, &update).unwrap();
        mock.assert();
    }

    #[test]
    fn api_error_carries_status() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/repos/acme/widgets/milestones/9")
            .with_status(404)
            .with_body("{\"message\":\"Not Found\"}")
            .create();

        let tracker = GithubTracker::with_base_url("tok", server.url());
        let mref = MilestoneRef {
            repo: RepoRef::new("acme", "widgets"),
            number: 9,
        };
        let err = tracker.get_milestone(&mref).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Api {
                service: "github",
                status: 404,
                ..
            }
        ));
        assert!(!err.is_transient());
    }
}
