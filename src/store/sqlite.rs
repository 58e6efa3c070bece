use std::time::Duration;

use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use super::{
    now_utc_rfc3339, EntityKind, StoreError, StoryCatalog, StoryStore, TransactionalStore,
};
use crate::domain::capacity::{word_count, CapacityPolicy};
use crate::domain::model::{
    join_word, Paragraph, ParagraphId, Sentence, SentenceId, Story, StoryId,
};

pub const CURRENT_SCHEMA_VERSION: i64 = 2;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 2] = [
    Migration {
        version: 1,
        name: "baseline_story_schema_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT '',
    title_complete INTEGER NOT NULL DEFAULT 0,
    finished INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS paragraphs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    story_id INTEGER NOT NULL REFERENCES stories(id),
    finished INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS sentences (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    paragraph_id INTEGER NOT NULL REFERENCES paragraphs(id),
    finished INTEGER NOT NULL DEFAULT 0,
    content TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_paragraphs_story ON paragraphs(story_id, finished);
CREATE INDEX IF NOT EXISTS idx_sentences_paragraph ON sentences(paragraph_id, finished);
"#,
    },
    Migration {
        version: 2,
        name: "single_open_container_v1",
        sql: r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_stories_single_open
    ON stories(finished) WHERE finished = 0;
CREATE UNIQUE INDEX IF NOT EXISTS idx_paragraphs_single_open
    ON paragraphs(story_id) WHERE finished = 0;
CREATE UNIQUE INDEX IF NOT EXISTS idx_sentences_single_open
    ON sentences(paragraph_id) WHERE finished = 0;
"#,
    },
];

pub fn open_connection(path: &str, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure(&conn, busy_timeout)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

fn configure(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "ON")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_utc_rfc3339()],
        )?;
    }

    tx.execute(
        r#"
INSERT INTO meta (key, value)
VALUES ('schema_version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()
}

/// SQLite-backed store. Transactions begin `IMMEDIATE`, so the write lock is
/// held from the first read of an append and other processes queue on the
/// busy timeout instead of interleaving.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = open_connection(path, busy_timeout)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl TransactionalStore for SqliteStore {
    fn with_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn StoryStore) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(busy_or_db)?;
        let value = f(&Scope { conn: &tx })?;
        tx.commit().map_err(busy_or_db)?;
        Ok(value)
    }
}

impl StoryCatalog for SqliteStore {
    fn count_stories(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM stories", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn list_stories(&self, limit: u32, offset: u32) -> Result<Vec<Story>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT id, title, title_complete, finished, created_at, updated_at
FROM stories
ORDER BY id ASC
LIMIT ?1 OFFSET ?2
"#,
        )?;
        let mut rows = stmt.query(params![limit, offset])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(story_from_row(row)?);
        }
        Ok(result)
    }

    fn find_story(&self, id: StoryId) -> Result<Option<Story>, StoreError> {
        get_story(&self.conn, id)
    }

    fn open_story(&self) -> Result<Option<Story>, StoreError> {
        get_unfinished_story(&self.conn)
    }

    fn story_paragraphs(&self, story_id: StoryId) -> Result<Vec<Paragraph>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, story_id, finished FROM paragraphs WHERE story_id = ?1 ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![story_id])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(paragraph_from_row(row)?);
        }
        Ok(result)
    }

    fn paragraph_sentences(&self, paragraph_id: ParagraphId) -> Result<Vec<Sentence>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT id, paragraph_id, finished, content
FROM sentences
WHERE paragraph_id = ?1
ORDER BY id ASC
"#,
        )?;
        let mut rows = stmt.query(params![paragraph_id])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(sentence_from_row(row)?);
        }
        Ok(result)
    }
}

/// Store view bound to one open transaction.
struct Scope<'c> {
    conn: &'c Connection,
}

impl StoryStore for Scope<'_> {
    fn unfinished_story(&self) -> Result<Option<Story>, StoreError> {
        get_unfinished_story(self.conn)
    }

    fn create_story(&self) -> Result<StoryId, StoreError> {
        let now = now_utc_rfc3339();
        self.conn.execute(
            "INSERT INTO stories (created_at, updated_at) VALUES (?1, ?1)",
            params![now],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(story_id = id, "created story row");
        Ok(id)
    }

    fn story(&self, id: StoryId) -> Result<Option<Story>, StoreError> {
        get_story(self.conn, id)
    }

    fn append_to_story_title(
        &self,
        id: StoryId,
        word: &str,
        policy: &CapacityPolicy,
    ) -> Result<Story, StoreError> {
        let story = get_story(self.conn, id)?.ok_or(StoreError::Missing {
            kind: EntityKind::Story,
            id,
        })?;
        if story.title_complete {
            return Err(StoreError::AlreadyFinished {
                kind: EntityKind::Title,
                id,
            });
        }

        let title = join_word(&story.title, word);
        let title_complete = policy.title_complete(word_count(&title));
        let updated_at = now_utc_rfc3339();
        self.conn.execute(
            "UPDATE stories SET title = ?1, title_complete = ?2, updated_at = ?3 WHERE id = ?4",
            params![title, title_complete, updated_at, id],
        )?;

        Ok(Story {
            title,
            title_complete,
            updated_at,
            ..story
        })
    }

    fn touch_story(&self, id: StoryId) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE stories SET updated_at = ?1 WHERE id = ?2",
            params![now_utc_rfc3339(), id],
        )?;
        require_changed(changed, EntityKind::Story, id)
    }

    fn mark_story_finished(&self, id: StoryId) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE stories SET finished = 1, updated_at = ?1 WHERE id = ?2",
            params![now_utc_rfc3339(), id],
        )?;
        require_changed(changed, EntityKind::Story, id)
    }

    fn unfinished_paragraph(&self, story_id: StoryId) -> Result<Option<Paragraph>, StoreError> {
        Ok(self
            .conn
            .query_row(
                r#"
SELECT id, story_id, finished
FROM paragraphs
WHERE story_id = ?1 AND finished = 0
ORDER BY id ASC
LIMIT 1
"#,
                params![story_id],
                paragraph_from_row,
            )
            .optional()?)
    }

    fn create_paragraph(&self, story_id: StoryId) -> Result<ParagraphId, StoreError> {
        if get_story(self.conn, story_id)?.is_none() {
            return Err(StoreError::Missing {
                kind: EntityKind::Story,
                id: story_id,
            });
        }
        self.conn.execute(
            "INSERT INTO paragraphs (story_id) VALUES (?1)",
            params![story_id],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(story_id, paragraph_id = id, "created paragraph row");
        Ok(id)
    }

    fn paragraph(&self, id: ParagraphId) -> Result<Option<Paragraph>, StoreError> {
        get_paragraph(self.conn, id)
    }

    fn count_finished_paragraphs(&self, story_id: StoryId) -> Result<u32, StoreError> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM paragraphs WHERE story_id = ?1 AND finished = 1",
            params![story_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn mark_paragraph_finished(&self, id: ParagraphId) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE paragraphs SET finished = 1 WHERE id = ?1",
            params![id],
        )?;
        require_changed(changed, EntityKind::Paragraph, id)
    }

    fn unfinished_sentence(
        &self,
        paragraph_id: ParagraphId,
    ) -> Result<Option<Sentence>, StoreError> {
        Ok(self
            .conn
            .query_row(
                r#"
SELECT id, paragraph_id, finished, content
FROM sentences
WHERE paragraph_id = ?1 AND finished = 0
ORDER BY id ASC
LIMIT 1
"#,
                params![paragraph_id],
                sentence_from_row,
            )
            .optional()?)
    }

    fn create_sentence(
        &self,
        paragraph_id: ParagraphId,
        word: &str,
        policy: &CapacityPolicy,
    ) -> Result<Sentence, StoreError> {
        if get_paragraph(self.conn, paragraph_id)?.is_none() {
            return Err(StoreError::Missing {
                kind: EntityKind::Paragraph,
                id: paragraph_id,
            });
        }
        let finished = policy.sentence_complete(1);
        self.conn.execute(
            "INSERT INTO sentences (paragraph_id, finished, content) VALUES (?1, ?2, ?3)",
            params![paragraph_id, finished, word],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(paragraph_id, sentence_id = id, "created sentence row");
        Ok(Sentence {
            id,
            paragraph_id,
            finished,
            content: word.to_string(),
        })
    }

    fn append_to_sentence(
        &self,
        id: SentenceId,
        word: &str,
        policy: &CapacityPolicy,
    ) -> Result<Sentence, StoreError> {
        let sentence = get_sentence(self.conn, id)?.ok_or(StoreError::Missing {
            kind: EntityKind::Sentence,
            id,
        })?;
        if sentence.finished {
            return Err(StoreError::AlreadyFinished {
                kind: EntityKind::Sentence,
                id,
            });
        }

        let content = join_word(&sentence.content, word);
        let finished = policy.sentence_complete(word_count(&content));
        self.conn.execute(
            "UPDATE sentences SET content = ?1, finished = ?2 WHERE id = ?3",
            params![content, finished, id],
        )?;

        Ok(Sentence {
            content,
            finished,
            ..sentence
        })
    }

    fn count_finished_sentences(&self, paragraph_id: ParagraphId) -> Result<u32, StoreError> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM sentences WHERE paragraph_id = ?1 AND finished = 1",
            params![paragraph_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// A writer that outlasted the busy timeout makes the store unavailable
/// rather than broken.
fn busy_or_db(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            StoreError::Unavailable(format!("database busy: {err}"))
        }
        _ => StoreError::Db(err),
    }
}

fn require_changed(changed: usize, kind: EntityKind, id: i64) -> Result<(), StoreError> {
    if changed == 0 {
        Err(StoreError::Missing { kind, id })
    } else {
        Ok(())
    }
}

fn get_story(conn: &Connection, id: StoryId) -> Result<Option<Story>, StoreError> {
    Ok(conn
        .query_row(
            r#"
SELECT id, title, title_complete, finished, created_at, updated_at
FROM stories
WHERE id = ?1
"#,
            params![id],
            story_from_row,
        )
        .optional()?)
}

fn get_unfinished_story(conn: &Connection) -> Result<Option<Story>, StoreError> {
    Ok(conn
        .query_row(
            r#"
SELECT id, title, title_complete, finished, created_at, updated_at
FROM stories
WHERE finished = 0
ORDER BY id ASC
LIMIT 1
"#,
            [],
            story_from_row,
        )
        .optional()?)
}

fn get_paragraph(conn: &Connection, id: ParagraphId) -> Result<Option<Paragraph>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, story_id, finished FROM paragraphs WHERE id = ?1",
            params![id],
            paragraph_from_row,
        )
        .optional()?)
}

fn get_sentence(conn: &Connection, id: SentenceId) -> Result<Option<Sentence>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, paragraph_id, finished, content FROM sentences WHERE id = ?1",
            params![id],
            sentence_from_row,
        )
        .optional()?)
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<Story> {
    Ok(Story {
        id: row.get(0)?,
        title: row.get(1)?,
        title_complete: row.get(2)?,
        finished: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn paragraph_from_row(row: &Row<'_>) -> rusqlite::Result<Paragraph> {
    Ok(Paragraph {
        id: row.get(0)?,
        story_id: row.get(1)?,
        finished: row.get(2)?,
    })
}

fn sentence_from_row(row: &Row<'_>) -> rusqlite::Result<Sentence> {
    Ok(Sentence {
        id: row.get(0)?,
        paragraph_id: row.get(1)?,
        finished: row.get(2)?,
        content: row.get(3)?,
    })
}
