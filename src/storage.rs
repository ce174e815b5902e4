use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};

/// Device-local state: the device id and everything this device has liked.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LikeKind {
    Post,
    Comment,
}

impl LikeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeKind::Post => "post",
            LikeKind::Comment => "comment",
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("storage: set busy timeout")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("storage: open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    /// Stable identifier for this device, created on first use.
    pub fn device_id(&self) -> Result<String> {
        let conn = self.conn.lock();
        let existing: Option<String> = conn
            .query_row("SELECT device_id FROM device WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .context("storage: query device id")?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let id = hex::encode(bytes);
        conn.execute(
            "INSERT INTO device (id, device_id, created_at) VALUES (1, ?1, ?2)",
            params![id, Utc::now().timestamp()],
        )
        .context("storage: insert device id")?;
        Ok(id)
    }

    /// Returns false when the item was already recorded.
    pub fn insert_like(&self, kind: LikeKind, item_id: &str) -> Result<bool> {
        if item_id.is_empty() {
            bail!("storage: item id required for like");
        }
        let conn = self.conn.lock();
        let inserted = conn.execute(
            r#"
INSERT INTO liked_items (kind, item_id, liked_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(kind, item_id) DO NOTHING
"#,
            params![kind.as_str(), item_id, Utc::now().timestamp()],
        )?;
        Ok(inserted > 0)
    }

    pub fn delete_like(&self, kind: LikeKind, item_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM liked_items WHERE kind = ?1 AND item_id = ?2",
            params![kind.as_str(), item_id],
        )
        .context("storage: delete like")?;
        Ok(())
    }

    /// Ids liked under `kind`, oldest like first.
    pub fn list_likes(&self, kind: LikeKind) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
SELECT item_id
FROM liked_items
WHERE kind = ?1
ORDER BY liked_at ASC, item_id ASC
"#,
        )?;
        let rows = stmt
            .query_map(params![kind.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }

    #[cfg(test)]
    pub(crate) fn drop_likes_table(&self) {
        self.conn
            .lock()
            .execute_batch("DROP TABLE liked_items")
            .expect("drop liked_items");
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let migrations = migrations();
    for (idx, sql) in migrations.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![
                version,
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_secs() as i64,
            ],
        )?;
        tracing::debug!(version, "storage: applied migration");
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS device (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  device_id TEXT NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS liked_items (
  kind TEXT NOT NULL,
  item_id TEXT NOT NULL,
  liked_at INTEGER NOT NULL,
  PRIMARY KEY (kind, item_id)
);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("wishwall").join("state.db"))
}
