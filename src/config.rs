use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::depth::DEFAULT_MAX_DEPTH;
use crate::model::SortMode;

const DEFAULT_ENV_PREFIX: &str = "WISHWALL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub comments: CommentsConfig,
    #[serde(default)]
    pub posts: PostsConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

impl BackendConfig {
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }
}

fn default_user_agent() -> String {
    format!("wishwall/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentsConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub default_sort: SortMode,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            default_sort: SortMode::default(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_message_chars() -> usize {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostsConfig {
    #[serde(default)]
    pub default_sort: SortMode,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_popular_count")]
    pub popular_count: usize,
    #[serde(default = "default_max_name_chars")]
    pub max_name_chars: usize,
}

impl Default for PostsConfig {
    fn default() -> Self {
        Self {
            default_sort: SortMode::default(),
            page_size: default_page_size(),
            popular_count: default_popular_count(),
            max_name_chars: default_max_name_chars(),
        }
    }
}

fn default_page_size() -> usize {
    6
}

fn default_popular_count() -> usize {
    5
}

fn default_max_name_chars() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModerationConfig {
    /// Extra words to reject, on top of the built-in list.
    #[serde(default)]
    pub blocked_words: Vec<String>,
    #[serde(default = "default_builtin_words")]
    pub builtin_words: bool,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            blocked_words: Vec::new(),
            builtin_words: default_builtin_words(),
        }
    }
}

fn default_builtin_words() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.backend.base_url.is_empty() {
        base.backend.base_url = other.backend.base_url;
    }
    if !other.backend.api_key.is_empty() {
        base.backend.api_key = other.backend.api_key;
    }
    if !other.backend.user_agent.is_empty() {
        base.backend.user_agent = other.backend.user_agent;
    }
    if !other.backend.timeout.is_zero() {
        base.backend.timeout = other.backend.timeout;
    }

    base.comments.max_depth = other.comments.max_depth;
    base.comments.default_sort = other.comments.default_sort;
    if other.comments.max_message_chars != 0 {
        base.comments.max_message_chars = other.comments.max_message_chars;
    }

    base.posts.default_sort = other.posts.default_sort;
    if other.posts.page_size != 0 {
        base.posts.page_size = other.posts.page_size;
    }
    base.posts.popular_count = other.posts.popular_count;
    if other.posts.max_name_chars != 0 {
        base.posts.max_name_chars = other.posts.max_name_chars;
    }

    if !other.moderation.blocked_words.is_empty() {
        base.moderation.blocked_words = other.moderation.blocked_words;
    }
    base.moderation.builtin_words = other.moderation.builtin_words;

    if other.storage.path.is_some() {
        base.storage.path = other.storage.path;
    }

    base
}

/// Environment overrides are applied field by field on top of the file, so
/// an unset variable never resets a value the file chose.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "backend.base_url" => cfg.backend.base_url = value,
        "backend.api_key" => cfg.backend.api_key = value,
        "backend.user_agent" => cfg.backend.user_agent = value,
        "backend.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.backend.timeout = duration;
            }
        }
        "comments.max_depth" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.comments.max_depth = parsed;
            }
        }
        "comments.default_sort" => {
            if let Ok(mode) = value.parse::<SortMode>() {
                cfg.comments.default_sort = mode;
            }
        }
        "comments.max_message_chars" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.comments.max_message_chars = parsed;
            }
        }
        "posts.default_sort" => {
            if let Ok(mode) = value.parse::<SortMode>() {
                cfg.posts.default_sort = mode;
            }
        }
        "posts.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.posts.page_size = parsed;
            }
        }
        "posts.popular_count" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.posts.popular_count = parsed;
            }
        }
        "posts.max_name_chars" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.posts.max_name_chars = parsed;
            }
        }
        "moderation.blocked_words" => {
            cfg.moderation.blocked_words = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "moderation.builtin_words" => {
            if let Ok(parsed) = value.parse::<bool>() {
                cfg.moderation.builtin_words = parsed;
            }
        }
        "storage.path" => cfg.storage.path = Some(PathBuf::from(value)),
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wishwall").join("config.yaml"))
}

pub fn save_backend_credentials(
    path: Option<PathBuf>,
    base_url: &str,
    api_key: &str,
) -> Result<PathBuf> {
    let base_url = base_url.trim();
    let api_key = api_key.trim();

    anyhow::ensure!(!base_url.is_empty(), "config: backend.base_url is required");
    url::Url::parse(base_url)
        .with_context(|| format!("config: backend.base_url {base_url:?} is not a URL"))?;

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };

    cfg.backend.base_url = base_url.to_string();
    cfg.backend.api_key = api_key.to_string();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}
