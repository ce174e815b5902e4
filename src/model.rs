use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment as handed to the core, already normalized by the store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: String,
    pub post_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub author: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub likes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Contact {
    Email(String),
    Phone(String),
}

impl Contact {
    /// Splits a free-form contact field the way the wall form stores it:
    /// anything with an `@` is an email, the rest is a phone number.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else if raw.contains('@') {
            Some(Contact::Email(raw.to_string()))
        } else {
            Some(Contact::Phone(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Contact::Email(value) | Contact::Phone(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStyle {
    #[default]
    Letter,
    Memo,
    Postcard,
    Sticky,
    Modern,
}

impl CardStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStyle::Letter => "letter",
            CardStyle::Memo => "memo",
            CardStyle::Postcard => "postcard",
            CardStyle::Sticky => "sticky",
            CardStyle::Modern => "modern",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub contact: Option<Contact>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub card_style: CardStyle,
    #[serde(default)]
    pub card_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewComment {
    pub author: Option<String>,
    pub message: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPost {
    pub name: Option<String>,
    pub affiliation: Option<String>,
    pub contact: Option<Contact>,
    pub message: String,
    pub card_style: CardStyle,
    pub card_color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Latest,
    Oldest,
    Popular,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Latest => "latest",
            SortMode::Oldest => "oldest",
            SortMode::Popular => "popular",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SortMode::Latest => "Newest first",
            SortMode::Oldest => "Oldest first",
            SortMode::Popular => "Most liked",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" | "new" | "newest" => Ok(SortMode::Latest),
            "oldest" | "old" => Ok(SortMode::Oldest),
            "popular" | "top" => Ok(SortMode::Popular),
            other => bail!("unknown sort mode {other:?}"),
        }
    }
}
