//! Persistence seam for the story hierarchy.
//!
//! [`StoryStore`] is the per-transaction view the append engine works
//! against; [`TransactionalStore`] scopes those calls into one atomic unit;
//! [`StoryCatalog`] is the read-only side used for listing and detail views.

#[cfg(test)]
pub mod memory;
pub mod sqlite;

use std::fmt;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::capacity::CapacityPolicy;
use crate::domain::model::{Paragraph, ParagraphId, Sentence, SentenceId, Story, StoryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Story,
    Title,
    Paragraph,
    Sentence,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Story => "story",
            EntityKind::Title => "title",
            EntityKind::Paragraph => "paragraph",
            EntityKind::Sentence => "sentence",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("{kind} {id} does not exist")]
    Missing { kind: EntityKind, id: i64 },
    #[error("{kind} {id} is already finished")]
    AlreadyFinished { kind: EntityKind, id: i64 },
}

impl StoreError {
    /// True when the error points at a broken hierarchy rather than an
    /// unreachable backend.
    pub fn is_inconsistency(&self) -> bool {
        match self {
            StoreError::Missing { .. } | StoreError::AlreadyFinished { .. } => true,
            StoreError::Db(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

pub trait StoryStore {
    fn unfinished_story(&self) -> Result<Option<Story>, StoreError>;
    fn create_story(&self) -> Result<StoryId, StoreError>;
    fn story(&self, id: StoryId) -> Result<Option<Story>, StoreError>;
    /// Joins `word` onto the title and flags it complete once the policy's
    /// title capacity is reached. Bumps `updated_at`.
    fn append_to_story_title(
        &self,
        id: StoryId,
        word: &str,
        policy: &CapacityPolicy,
    ) -> Result<Story, StoreError>;
    fn touch_story(&self, id: StoryId) -> Result<(), StoreError>;
    fn mark_story_finished(&self, id: StoryId) -> Result<(), StoreError>;

    fn unfinished_paragraph(&self, story_id: StoryId) -> Result<Option<Paragraph>, StoreError>;
    fn create_paragraph(&self, story_id: StoryId) -> Result<ParagraphId, StoreError>;
    fn paragraph(&self, id: ParagraphId) -> Result<Option<Paragraph>, StoreError>;
    fn count_finished_paragraphs(&self, story_id: StoryId) -> Result<u32, StoreError>;
    fn mark_paragraph_finished(&self, id: ParagraphId) -> Result<(), StoreError>;

    fn unfinished_sentence(
        &self,
        paragraph_id: ParagraphId,
    ) -> Result<Option<Sentence>, StoreError>;
    /// Starts a sentence holding `word`; it is created finished when a single
    /// word already meets the sentence capacity.
    fn create_sentence(
        &self,
        paragraph_id: ParagraphId,
        word: &str,
        policy: &CapacityPolicy,
    ) -> Result<Sentence, StoreError>;
    fn append_to_sentence(
        &self,
        id: SentenceId,
        word: &str,
        policy: &CapacityPolicy,
    ) -> Result<Sentence, StoreError>;
    fn count_finished_sentences(&self, paragraph_id: ParagraphId) -> Result<u32, StoreError>;
}

pub trait TransactionalStore {
    /// Runs `f` inside one transaction. `Ok` commits; `Err` or a panic
    /// inside `f` rolls back every write `f` made. Begin and commit failures
    /// are surfaced through `E: From<StoreError>`.
    fn with_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn StoryStore) -> Result<T, E>,
        E: From<StoreError>;
}

pub trait StoryCatalog {
    fn count_stories(&self) -> Result<u64, StoreError>;
    /// Stories in creation order.
    fn list_stories(&self, limit: u32, offset: u32) -> Result<Vec<Story>, StoreError>;
    fn find_story(&self, id: StoryId) -> Result<Option<Story>, StoreError>;
    fn open_story(&self) -> Result<Option<Story>, StoreError>;
    fn story_paragraphs(&self, story_id: StoryId) -> Result<Vec<Paragraph>, StoreError>;
    fn paragraph_sentences(&self, paragraph_id: ParagraphId) -> Result<Vec<Sentence>, StoreError>;
}

pub fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("RFC3339 formatting for UTC timestamp should never fail")
}
