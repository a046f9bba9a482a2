use crate::error::{Result, SyncError};
use crate::github::RepoRef;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "boardsync.yaml";

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GithubConfig {
    /// Personal access token; falls back to `GITHUB_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrelloConfig {
    /// Developer key; falls back to `TRELLO_API_KEY`.
    #[serde(default)]
    pub key: Option<String>,
    /// Member token; falls back to `TRELLO_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
}

// ---------------------------------------------------------------------------
// BoardConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Board name as shown in Trello.
    pub name: String,
    /// List where cards for new milestones land.
    #[serde(default = "default_intake_list")]
    pub intake_list: String,
    /// Repositories whose open milestones are collected, in order.
    pub repos: Vec<RepoRef>,
    /// Owner (and fallback repo) for milestones created from cards.
    pub default_repo: RepoRef,
    /// Unlinked cards carrying any of these labels never become milestones.
    #[serde(default = "default_ignore_labels")]
    pub ignore_labels: Vec<String>,
    /// Label marking composite release cards.
    #[serde(default = "default_release_label")]
    pub release_label: String,
}

fn default_intake_list() -> String {
    "To Schedule".to_string()
}

fn default_ignore_labels() -> Vec<String> {
    vec![
        "Release".to_string(),
        "Key Date".to_string(),
        "Important Date".to_string(),
    ]
}

fn default_release_label() -> String {
    "Release".to_string()
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub trello: TrelloConfig,
    #[serde(default)]
    pub boards: Vec<BoardConfig>,
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: SyncConfig = serde_yaml::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.boards.is_empty() {
            return Err(SyncError::Config("no boards configured".into()));
        }
        for board in &self.boards {
            if board.repos.is_empty() {
                return Err(SyncError::Config(format!(
                    "board '{}' has no repositories to consider",
                    board.name
                )));
            }
        }
        Ok(())
    }

    pub fn board(&self, name: &str) -> Option<&BoardConfig> {
        self.boards.iter().find(|b| b.name == name)
    }

    pub fn github_token(&self) -> Result<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .ok_or_else(|| {
                SyncError::Config("github token not set (github.token or GITHUB_TOKEN)".into())
            })
    }

    pub fn trello_credentials(&self) -> Result<(String, String)> {
        let key = self
            .trello
            .key
            .clone()
            .or_else(|| std::env::var("TRELLO_API_KEY").ok())
            .ok_or_else(|| {
                SyncError::Config("trello key not set (trello.key or TRELLO_API_KEY)".into())
            })?;
        let token = self
            .trello
            .token
            .clone()
            .or_else(|| std::env::var("TRELLO_TOKEN").ok())
            .ok_or_else(|| {
                SyncError::Config("trello token not set (trello.token or TRELLO_TOKEN)".into())
            })?;
        Ok((key, token))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
