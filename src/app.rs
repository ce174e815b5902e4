use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::backend;
use crate::board::{BoardOptions, CommentBoard};
use crate::config::{self, Config};
use crate::data::{self, CommentService, PostService};
use crate::depth::DepthLimit;
use crate::engagement::Tracker;
use crate::model::{PostRecord, SortMode};
use crate::names::{NameGenerator, RandomNames};
use crate::storage;
use crate::thread::VisibleRow;
use crate::validate::{self, ContentFilter, Limits, WordListFilter};
use crate::wall::{Wall, WallOptions};

const WRAP_WIDTH: usize = 76;
const TOP_COMMENTS: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct Args {
    pub config: Option<PathBuf>,
    pub demo: bool,
    pub sort: Option<SortMode>,
    pub post_id: Option<String>,
    /// Base url and api key to write into the config file instead of running.
    pub set_backend: Option<(String, String)>,
}

pub fn run(args: Args) -> Result<()> {
    if let Some((base_url, api_key)) = &args.set_backend {
        let path = config::save_backend_credentials(args.config.clone(), base_url, api_key)
            .context("save backend settings")?;
        tracing::info!(path = %path.display(), "saved backend settings");
        println!("Saved backend settings to {}", friendly_path(Some(&path)));
        return Ok(());
    }

    let cfg = config::load(config::LoadOptions {
        config_file: args.config.clone(),
        env_prefix: None,
    })
    .context("load config")?;

    let names: Arc<dyn NameGenerator> = Arc::new(RandomNames);
    let (posts, comments, store) = if args.demo {
        let wall = Arc::new(data::demo_wall(names.clone()));
        let store = storage::Store::in_memory().context("open demo storage")?;
        (
            wall.clone() as Arc<dyn PostService>,
            wall as Arc<dyn CommentService>,
            store,
        )
    } else {
        let (posts, comments) = remote_services(&cfg, names.clone())?;
        let store = storage::Store::open(storage::Options {
            path: cfg.storage.path.clone(),
        })
        .context("open storage")?;
        (posts, comments, store)
    };
    let store = Arc::new(store);
    let tracker = Tracker::load(store.clone()).context("load liked items")?;
    let device = store.device_id().context("read device id")?;
    tracing::debug!(%device, demo = args.demo, "starting");

    let filter: Arc<dyn ContentFilter> = Arc::new(if cfg.moderation.builtin_words {
        WordListFilter::with_builtin(&cfg.moderation.blocked_words)
    } else {
        WordListFilter::new(&cfg.moderation.blocked_words)
    });
    let limits = Limits {
        max_message_chars: cfg.comments.max_message_chars,
        max_name_chars: cfg.posts.max_name_chars,
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.post_id.as_deref() {
        None => {
            let mut wall = Wall::new(
                posts,
                WallOptions {
                    sort: args.sort.unwrap_or(cfg.posts.default_sort),
                    page_size: cfg.posts.page_size,
                    popular_count: cfg.posts.popular_count,
                    limits,
                    filter,
                },
            );
            wall.refresh()?;
            write!(out, "{}", render_wall(&wall, &tracker))?;
        }
        Some(post_id) => {
            let post = posts
                .get_post(post_id)
                .with_context(|| format!("load post {post_id}"))?;
            let Some(post) = post else {
                bail!("post {post_id} not found");
            };
            let mut board = CommentBoard::new(
                post_id,
                comments,
                BoardOptions {
                    sort: args.sort.unwrap_or(cfg.comments.default_sort),
                    depth: DepthLimit::new(cfg.comments.max_depth),
                    limits,
                    filter,
                },
            );
            board.refresh(&tracker)?;
            write!(out, "{}", render_thread(&post, &board))?;
        }
    }
    out.flush()?;

    drop(tracker);
    if let Ok(store) = Arc::try_unwrap(store) {
        store.close()?;
    }
    Ok(())
}

fn remote_services(
    cfg: &Config,
    names: Arc<dyn NameGenerator>,
) -> Result<(Arc<dyn PostService>, Arc<dyn CommentService>)> {
    if !cfg.backend.is_configured() {
        bail!(
            "backend.base_url is not set; add it to {} or WISHWALL_BACKEND__BASE_URL, or run with --demo",
            friendly_path(config::default_path().as_ref())
        );
    }
    let client = backend::Client::new(backend::ClientConfig {
        base_url: cfg.backend.base_url.clone(),
        api_key: cfg.backend.api_key.clone(),
        user_agent: cfg.backend.user_agent.clone(),
        timeout: cfg.backend.timeout,
        names,
        http_client: None,
    })?;
    let client = Arc::new(client);
    Ok((
        Arc::new(data::RestPostService::new(client.clone())),
        Arc::new(data::RestCommentService::new(client)),
    ))
}

pub fn render_wall(wall: &Wall, tracker: &Tracker) -> String {
    let mut out = String::new();
    let popular = wall.popular();
    if !popular.is_empty() {
        out.push_str("Most liked\n");
        for post in &popular {
            out.push_str(&format!(
                "  {} ({} likes) {}\n",
                post.name,
                post.likes,
                excerpt(&post.message, 40)
            ));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "{} posts, {}\n\n",
        wall.len(),
        wall.sort().display_name().to_lowercase()
    ));
    for post in wall.visible() {
        let liked = if tracker.liked_posts().contains(&post.id) {
            " *"
        } else {
            ""
        };
        out.push_str(&format!(
            "[{}] {}{} · {} likes · {}\n",
            post.id,
            post_byline(post),
            liked,
            post.likes,
            post.created_at.format("%Y-%m-%d %H:%M")
        ));
        out.push_str(&wrap(&validate::strip_tags(&post.message), "    "));
        out.push('\n');
    }
    if wall.has_more() {
        out.push_str(&format!(
            "... {} more\n",
            wall.len() - wall.visible().len()
        ));
    }
    out
}

pub fn render_thread(post: &PostRecord, board: &CommentBoard) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} · {} likes\n", post_byline(post), post.likes));
    out.push_str(&wrap(&validate::strip_tags(&post.message), "  "));
    out.push_str(&format!(
        "\n{} comments, {}\n\n",
        board.comment_count(),
        board.sort().display_name().to_lowercase()
    ));
    let top: Vec<_> = board
        .top_comments(TOP_COMMENTS)
        .into_iter()
        .filter(|c| c.likes > 0)
        .collect();
    if !top.is_empty() {
        out.push_str("Top comments\n");
        for comment in &top {
            out.push_str(&format!(
                "  {} ({} likes) {}\n",
                comment.author,
                comment.likes,
                excerpt(&comment.message, 40)
            ));
        }
        out.push('\n');
    }
    for row in board.visible_rows() {
        out.push_str(&render_row(&row));
    }
    out
}

fn render_row(row: &VisibleRow<'_>) -> String {
    let node = row.node;
    let indent = "  ".repeat(row.depth);
    let mut header = format!(
        "{indent}- {} · {} likes{}",
        node.comment.author,
        node.comment.likes,
        if node.liked { " *" } else { "" }
    );
    if node.collapsed && !node.children.is_empty() {
        header.push_str(&format!(" [+{} hidden]", node.descendant_count()));
    }
    if row.can_reply {
        header.push_str(&format!(" (reply: {})", node.id()));
    }
    header.push('\n');
    header.push_str(&wrap(
        &validate::strip_tags(&node.comment.message),
        &format!("{indent}    "),
    ));
    header
}

fn post_byline(post: &PostRecord) -> String {
    match post.affiliation.as_deref() {
        Some(affiliation) => format!("{} ({affiliation})", post.name),
        None => post.name.clone(),
    }
}

fn wrap(text: &str, indent: &str) -> String {
    let options = textwrap::Options::new(WRAP_WIDTH)
        .initial_indent(indent)
        .subsequent_indent(indent);
    let mut wrapped = textwrap::fill(text.trim(), options);
    wrapped.push('\n');
    wrapped
}

fn excerpt(text: &str, max: usize) -> String {
    let plain = validate::strip_tags(text);
    let plain = plain.trim();
    if plain.chars().count() <= max {
        return plain.to_string();
    }
    let cut: String = plain.chars().take(max).collect();
    format!("{}…", cut.trim_end())
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/wishwall/config.yaml".to_string()
    }
}
