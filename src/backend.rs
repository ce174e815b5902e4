use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::StoreError;
use crate::model::{CardStyle, CommentRecord, Contact, NewComment, NewPost, PostRecord};
use crate::names::{self, NameGenerator};

const REST_PATH: &str = "rest/v1/";

pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub names: Arc<dyn NameGenerator>,
    pub http_client: Option<HttpClient>,
}

/// Thin client for the hosted table API that stores posts and comments.
pub struct Client {
    http: HttpClient,
    user_agent: String,
    api_key: String,
    rest_url: Url,
    names: Arc<dyn NameGenerator>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("backend client user agent required");
        }
        let mut base = Url::parse(config.base_url.trim())
            .with_context(|| format!("backend: parse base url {:?}", config.base_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let rest_url = base.join(REST_PATH).context("backend: build rest url")?;

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder().timeout(config.timeout).build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            api_key: config.api_key,
            rest_url,
            names: config.names,
        })
    }

    pub fn posts(&self) -> Result<Vec<PostRecord>, StoreError> {
        let url = self.table_url("posts", &[("select", "*"), ("order", "created_at.desc")])?;
        let rows: Vec<PostRow> = self.send(self.http.get(url))?;
        Ok(rows.into_iter().map(|row| row.into_record(self.names.as_ref())).collect())
    }

    pub fn post(&self, id: &str) -> Result<Option<PostRecord>, StoreError> {
        let filter = format!("eq.{id}");
        let url = self.table_url("posts", &[("select", "*"), ("id", &filter)])?;
        let rows: Vec<PostRow> = self.send(self.http.get(url))?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.into_record(self.names.as_ref())))
    }

    pub fn insert_post(&self, post: &NewPost) -> Result<PostRecord, StoreError> {
        let (email, phone) = match &post.contact {
            Some(Contact::Email(email)) => (Some(email.as_str()), None),
            Some(Contact::Phone(phone)) => (None, Some(phone.as_str())),
            None => (None, None),
        };
        let name = names::or_generated(post.name.as_deref(), self.names.as_ref());
        let body = PostInsert {
            name: &name,
            affiliation: post.affiliation.as_deref(),
            email,
            phone,
            message: &post.message,
            card_style: post.card_style,
            card_color: post.card_color.as_deref(),
        };
        let url = self.table_url("posts", &[])?;
        let rows: Vec<PostRow> = self.send(
            self.http
                .post(url)
                .header("Prefer", "return=representation")
                .json(&body),
        )?;
        rows.into_iter()
            .next()
            .map(|row| row.into_record(self.names.as_ref()))
            .ok_or_else(|| StoreError::Decode("insert returned no post".into()))
    }

    pub fn comments(&self, post_id: &str) -> Result<Vec<CommentRecord>, StoreError> {
        let filter = format!("eq.{post_id}");
        let url = self.table_url(
            "comments",
            &[("select", "*"), ("post_id", &filter), ("order", "created_at.asc")],
        )?;
        let rows: Vec<CommentRow> = self.send(self.http.get(url))?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_record(self.names.as_ref()))
            .collect())
    }

    pub fn insert_comment(
        &self,
        post_id: &str,
        comment: &NewComment,
    ) -> Result<CommentRecord, StoreError> {
        let author = names::or_generated(comment.author.as_deref(), self.names.as_ref());
        let body = CommentInsert {
            post_id,
            author: &author,
            message: &comment.message,
            parent_id: comment.parent_id.as_deref(),
        };
        let url = self.table_url("comments", &[])?;
        let rows: Vec<CommentRow> = self.send(
            self.http
                .post(url)
                .header("Prefer", "return=representation")
                .json(&body),
        )?;
        rows.into_iter()
            .next()
            .map(|row| row.into_record(self.names.as_ref()))
            .ok_or_else(|| StoreError::Decode("insert returned no comment".into()))
    }

    pub fn increment_post_likes(&self, post_id: &str) -> Result<u64, StoreError> {
        self.rpc("increment_likes", &serde_json::json!({ "post_id": post_id }))
    }

    pub fn increment_comment_likes(&self, comment_id: &str) -> Result<u64, StoreError> {
        self.rpc(
            "increment_comment_likes",
            &serde_json::json!({ "comment_id": comment_id }),
        )
    }

    fn rpc(&self, function: &str, args: &serde_json::Value) -> Result<u64, StoreError> {
        let url = self
            .rest_url
            .join(&format!("rpc/{function}"))
            .map_err(|err| StoreError::Decode(format!("rpc url: {err}")))?;
        let count: i64 = self.send(self.http.post(url).json(args))?;
        Ok(count.max(0) as u64)
    }

    fn table_url(&self, table: &str, query: &[(&str, &str)]) -> Result<Url, StoreError> {
        let mut url = self
            .rest_url
            .join(table)
            .map_err(|err| StoreError::Decode(format!("table url: {err}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = request
            .header(USER_AGENT, &self.user_agent)
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .send()?;
        decode(response)
    }
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        tracing::warn!(status = status.as_u16(), %body, "backend request failed");
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = response.bytes()?;
    serde_json::from_slice(&bytes).map_err(|err| StoreError::Decode(err.to_string()))
}

/// A `posts` row as the backend returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct PostRow {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: Option<i64>,
    #[serde(default)]
    pub card_style: Option<CardStyle>,
    #[serde(default)]
    pub card_color: Option<String>,
}

impl PostRow {
    pub fn into_record(self, names: &dyn NameGenerator) -> PostRecord {
        let contact = non_blank(self.email)
            .map(Contact::Email)
            .or_else(|| non_blank(self.phone).map(Contact::Phone));
        PostRecord {
            id: self.id,
            name: names::or_generated(self.name.as_deref(), names),
            affiliation: non_blank(self.affiliation),
            contact,
            message: self.message,
            created_at: self.created_at,
            likes: self.likes.unwrap_or(0).max(0) as u64,
            card_style: self.card_style.unwrap_or_default(),
            card_color: non_blank(self.card_color),
        }
    }
}

/// A `comments` row as the backend returns it. Older rows carry the author
/// in `name` instead of `author`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub likes: Option<i64>,
}

impl CommentRow {
    pub fn into_record(self, names: &dyn NameGenerator) -> CommentRecord {
        let author = non_blank(self.author).or_else(|| non_blank(self.name));
        CommentRecord {
            id: self.id,
            post_id: self.post_id,
            parent_id: non_blank(self.parent_id),
            author: names::or_generated(author.as_deref(), names),
            message: self.message,
            created_at: self.created_at,
            updated_at: self.updated_at,
            likes: self.likes.unwrap_or(0).max(0) as u64,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Serialize)]
struct PostInsert<'a> {
    name: &'a str,
    affiliation: Option<&'a str>,
    email: Option<&'a str>,
    phone: Option<&'a str>,
    message: &'a str,
    card_style: CardStyle,
    card_color: Option<&'a str>,
}

#[derive(Serialize)]
struct CommentInsert<'a> {
    post_id: &'a str,
    author: &'a str,
    message: &'a str,
    parent_id: Option<&'a str>,
}
