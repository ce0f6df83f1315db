//! SQLite-backed reference store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};

use crate::config::ConfigStore;
use crate::error::ScrapeError;
use crate::models::{normalize_media_tags, parse_datetime, Reply, RootPost};
use crate::storage::HarvestStore;

/// SQLite store for root posts, replies, and the KV config table.
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(db_path: &Path) -> Result<Self, ScrapeError> {
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, ScrapeError> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<(), ScrapeError> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS root_posts (
                id TEXT PRIMARY KEY,
                author_name TEXT NOT NULL,
                author_handle TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                like_count INTEGER NOT NULL,
                reply_count INTEGER NOT NULL,
                repost_count INTEGER NOT NULL,
                fetched_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS replies (
                id TEXT PRIMARY KEY,
                root_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                author_name TEXT NOT NULL,
                author_handle TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                like_count INTEGER NOT NULL,
                reply_to TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_replies_root_id ON replies(root_id);
            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                description TEXT,
                updated_at TEXT NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    /// Replies under one root, oldest first. The root's own row is never
    /// returned even if an ingest bug wrote one.
    pub fn replies_for_root(&self, root_id: &str) -> Result<Vec<Reply>, ScrapeError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, root_id, author_id, author_name, author_handle, text,
                    created_at, like_count, reply_to
             FROM replies
             WHERE root_id = ?1 AND id != ?1
             ORDER BY created_at ASC",
        )?;

        let replies = stmt
            .query_map(params![root_id], |row| {
                Ok(Reply {
                    id: row.get("id")?,
                    root_id: row.get("root_id")?,
                    author_id: row.get("author_id")?,
                    author_name: row.get("author_name")?,
                    author_handle: row.get("author_handle")?,
                    text: row.get("text")?,
                    created_at: parse_datetime(&row.get::<_, String>("created_at")?),
                    like_count: row.get::<_, i64>("like_count")? as u64,
                    reply_to: row.get("reply_to")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(replies)
    }

    pub fn root_post(&self, id: &str) -> Result<Option<RootPost>, ScrapeError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, author_name, author_handle, text, created_at,
                    like_count, reply_count, repost_count
             FROM root_posts WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id], |row| {
            Ok(RootPost {
                id: row.get("id")?,
                author_name: row.get("author_name")?,
                author_handle: row.get("author_handle")?,
                text: row.get("text")?,
                created_at: parse_datetime(&row.get::<_, String>("created_at")?),
                like_count: row.get::<_, i64>("like_count")? as u64,
                reply_count: row.get::<_, i64>("reply_count")? as u64,
                repost_count: row.get::<_, i64>("repost_count")? as u64,
            })
        });

        match result {
            Ok(post) => Ok(Some(post)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl HarvestStore for SqliteStore {
    async fn upsert_root_post(&self, post: &RootPost) -> Result<(), ScrapeError> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO root_posts
                (id, author_name, author_handle, text, created_at,
                 like_count, reply_count, repost_count, fetched_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                like_count = excluded.like_count,
                reply_count = excluded.reply_count,
                repost_count = excluded.repost_count,
                fetched_at = excluded.fetched_at
            "#,
            params![
                post.id,
                post.author_name,
                post.author_handle,
                normalize_media_tags(&post.text),
                post.created_at.to_rfc3339(),
                post.like_count as i64,
                post.reply_count as i64,
                post.repost_count as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn upsert_reply(&self, reply: &Reply) -> Result<(), ScrapeError> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO replies
                (id, root_id, author_id, author_name, author_handle, text,
                 created_at, like_count, reply_to, fetched_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                like_count = excluded.like_count,
                fetched_at = excluded.fetched_at
            "#,
            params![
                reply.id,
                reply.root_id,
                reply.author_id,
                reply.author_name,
                reply.author_handle,
                normalize_media_tags(&reply.text),
                reply.created_at.to_rfc3339(),
                reply.like_count as i64,
                reply.reply_to,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ScrapeError> {
        let conn = self.connect()?;
        let result = conn.query_row(
            "SELECT value FROM config WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<(), ScrapeError> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO config (key, value, description, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                description = COALESCE(excluded.description, config.description),
                updated_at = excluded.updated_at
            "#,
            params![key, value, description, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&dir.path().join("harvest.db")).unwrap();
        (dir, store)
    }

    fn reply(id: &str, root_id: &str, likes: u64) -> Reply {
        Reply {
            id: id.to_string(),
            root_id: root_id.to_string(),
            author_id: "u1".to_string(),
            author_name: "Somebody".to_string(),
            author_handle: "somebody".to_string(),
            text: "赞同 [å›¾ç‰‡]".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 11, 20, 8, 0, 0).unwrap(),
            like_count: likes,
            reply_to: root_id.to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_reply_is_idempotent_and_keeps_created_at() {
        let (_dir, store) = temp_store();

        store.upsert_reply(&reply("r1", "root", 3)).await.unwrap();
        let mut second = reply("r1", "root", 9);
        second.created_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        store.upsert_reply(&second).await.unwrap();

        let replies = store.replies_for_root("root").unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].like_count, 9);
        // created_at survives the re-insert.
        assert_eq!(
            replies[0].created_at,
            Utc.with_ymd_and_hms(2024, 11, 20, 8, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn replies_query_excludes_the_root_row() {
        let (_dir, store) = temp_store();

        store.upsert_reply(&reply("root", "root", 1)).await.unwrap();
        store.upsert_reply(&reply("r1", "root", 2)).await.unwrap();

        let replies = store.replies_for_root("root").unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, "r1");
    }

    #[tokio::test]
    async fn media_tags_are_normalized_on_write() {
        let (_dir, store) = temp_store();
        store.upsert_reply(&reply("r1", "root", 0)).await.unwrap();

        let replies = store.replies_for_root("root").unwrap();
        assert_eq!(replies[0].text, "赞同 [图片]");
    }

    #[tokio::test]
    async fn root_post_roundtrip() {
        let (_dir, store) = temp_store();
        let post = RootPost {
            id: "p1".to_string(),
            author_name: "Demo".to_string(),
            author_handle: "demo".to_string(),
            text: "hello [视频]".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 11, 1, 12, 0, 0).unwrap(),
            like_count: 10,
            reply_count: 2,
            repost_count: 1,
        };
        store.upsert_root_post(&post).await.unwrap();

        let read = store.root_post("p1").unwrap().unwrap();
        assert_eq!(read, post);
        assert!(store.root_post("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn config_set_get_roundtrip() {
        let (_dir, store) = temp_store();
        assert!(store.get("PROXY_URL").await.unwrap().is_none());

        store
            .set("PROXY_URL", "socks5://127.0.0.1:1080", Some("outbound proxy"))
            .await
            .unwrap();
        assert_eq!(
            store.get("PROXY_URL").await.unwrap().as_deref(),
            Some("socks5://127.0.0.1:1080")
        );

        store.set("PROXY_URL", "http://127.0.0.1:7897", None).await.unwrap();
        assert_eq!(
            store.get("PROXY_URL").await.unwrap().as_deref(),
            Some("http://127.0.0.1:7897")
        );
    }
}
