//! In-memory store with snapshot transactions.
//!
//! Every call is counted, and a [`Fault`] can be armed to fail a chosen
//! operation, which makes this store double as a spy in engine tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use super::{
    now_utc_rfc3339, EntityKind, StoreError, StoryCatalog, StoryStore, TransactionalStore,
};
use crate::domain::capacity::{word_count, CapacityPolicy};
use crate::domain::model::{
    join_word, Paragraph, ParagraphId, Sentence, SentenceId, Story, StoryId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Begin,
    UnfinishedStory,
    CreateStory,
    Story,
    AppendTitle,
    TouchStory,
    MarkStoryFinished,
    UnfinishedParagraph,
    CreateParagraph,
    Paragraph,
    CountFinishedParagraphs,
    MarkParagraphFinished,
    UnfinishedSentence,
    CreateSentence,
    AppendSentence,
    CountFinishedSentences,
    Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail every call of this operation until cleared.
    FailOn(StoreOp),
    /// Keep the next commit but report it as failed, once.
    LostCommitAck,
    /// Lookups by id through this operation report the row as absent.
    Vanish(StoreOp),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    stories: BTreeMap<StoryId, Story>,
    paragraphs: BTreeMap<ParagraphId, Paragraph>,
    sentences: BTreeMap<SentenceId, Sentence>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RefCell<Tables>,
    fault: Cell<Option<Fault>>,
    calls: Cell<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, fault: Fault) {
        self.fault.set(Some(fault));
    }

    pub fn clear_fault(&self) {
        self.fault.set(None);
    }

    /// Number of store calls made so far, including begin and commit.
    pub fn calls(&self) -> u64 {
        self.calls.get()
    }

    pub fn sentences(&self) -> Vec<Sentence> {
        self.tables.borrow().sentences.values().cloned().collect()
    }

    pub fn paragraphs(&self) -> Vec<Paragraph> {
        self.tables.borrow().paragraphs.values().cloned().collect()
    }

    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        self.calls.set(self.calls.get() + 1);
        match self.fault.get() {
            Some(Fault::FailOn(target)) if target == op => {
                Err(StoreError::Unavailable(format!("injected failure on {op:?}")))
            }
            _ => Ok(()),
        }
    }

    fn vanished(&self, op: StoreOp) -> bool {
        self.fault.get() == Some(Fault::Vanish(op))
    }
}

/// Restores the pre-transaction snapshot unless disarmed, including while
/// unwinding from a panic in the transaction body.
struct Rollback<'s> {
    tables: &'s RefCell<Tables>,
    snapshot: Option<Tables>,
}

impl Rollback<'_> {
    fn disarm(mut self) {
        self.snapshot = None;
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.tables.borrow_mut() = snapshot;
        }
    }
}

impl TransactionalStore for MemoryStore {
    fn with_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn StoryStore) -> Result<T, E>,
        E: From<StoreError>,
    {
        let this: &MemoryStore = self;
        this.enter(StoreOp::Begin)?;
        let rollback = Rollback {
            tables: &this.tables,
            snapshot: Some(this.tables.borrow().clone()),
        };

        let value = f(this)?;
        this.enter(StoreOp::Commit)?;
        rollback.disarm();

        if this.fault.get() == Some(Fault::LostCommitAck) {
            this.fault.set(None);
            return Err(StoreError::Unavailable(
                "commit acknowledgement lost".to_string(),
            )
            .into());
        }
        Ok(value)
    }
}

impl StoryStore for MemoryStore {
    fn unfinished_story(&self) -> Result<Option<Story>, StoreError> {
        self.enter(StoreOp::UnfinishedStory)?;
        Ok(first_open_story(&self.tables.borrow()))
    }

    fn create_story(&self) -> Result<StoryId, StoreError> {
        self.enter(StoreOp::CreateStory)?;
        let mut tables = self.tables.borrow_mut();
        let id = tables.next_id();
        let now = now_utc_rfc3339();
        tables.stories.insert(
            id,
            Story {
                id,
                title: String::new(),
                title_complete: false,
                finished: false,
                created_at: now.clone(),
                updated_at: now,
            },
        );
        Ok(id)
    }

    fn story(&self, id: StoryId) -> Result<Option<Story>, StoreError> {
        self.enter(StoreOp::Story)?;
        if self.vanished(StoreOp::Story) {
            return Ok(None);
        }
        Ok(self.tables.borrow().stories.get(&id).cloned())
    }

    fn append_to_story_title(
        &self,
        id: StoryId,
        word: &str,
        policy: &CapacityPolicy,
    ) -> Result<Story, StoreError> {
        self.enter(StoreOp::AppendTitle)?;
        let mut tables = self.tables.borrow_mut();
        let story = tables.stories.get_mut(&id).ok_or(StoreError::Missing {
            kind: EntityKind::Story,
            id,
        })?;
        if story.title_complete {
            return Err(StoreError::AlreadyFinished {
                kind: EntityKind::Title,
                id,
            });
        }
        story.title = join_word(&story.title, word);
        story.title_complete = policy.title_complete(word_count(&story.title));
        story.updated_at = now_utc_rfc3339();
        Ok(story.clone())
    }

    fn touch_story(&self, id: StoryId) -> Result<(), StoreError> {
        self.enter(StoreOp::TouchStory)?;
        let mut tables = self.tables.borrow_mut();
        let story = tables.stories.get_mut(&id).ok_or(StoreError::Missing {
            kind: EntityKind::Story,
            id,
        })?;
        story.updated_at = now_utc_rfc3339();
        Ok(())
    }

    fn mark_story_finished(&self, id: StoryId) -> Result<(), StoreError> {
        self.enter(StoreOp::MarkStoryFinished)?;
        let mut tables = self.tables.borrow_mut();
        let story = tables.stories.get_mut(&id).ok_or(StoreError::Missing {
            kind: EntityKind::Story,
            id,
        })?;
        story.finished = true;
        story.updated_at = now_utc_rfc3339();
        Ok(())
    }

    fn unfinished_paragraph(&self, story_id: StoryId) -> Result<Option<Paragraph>, StoreError> {
        self.enter(StoreOp::UnfinishedParagraph)?;
        Ok(self
            .tables
            .borrow()
            .paragraphs
            .values()
            .find(|p| p.story_id == story_id && !p.finished)
            .cloned())
    }

    fn create_paragraph(&self, story_id: StoryId) -> Result<ParagraphId, StoreError> {
        self.enter(StoreOp::CreateParagraph)?;
        let mut tables = self.tables.borrow_mut();
        if !tables.stories.contains_key(&story_id) {
            return Err(StoreError::Missing {
                kind: EntityKind::Story,
                id: story_id,
            });
        }
        let id = tables.next_id();
        tables.paragraphs.insert(
            id,
            Paragraph {
                id,
                story_id,
                finished: false,
            },
        );
        Ok(id)
    }

    fn paragraph(&self, id: ParagraphId) -> Result<Option<Paragraph>, StoreError> {
        self.enter(StoreOp::Paragraph)?;
        if self.vanished(StoreOp::Paragraph) {
            return Ok(None);
        }
        Ok(self.tables.borrow().paragraphs.get(&id).cloned())
    }

    fn count_finished_paragraphs(&self, story_id: StoryId) -> Result<u32, StoreError> {
        self.enter(StoreOp::CountFinishedParagraphs)?;
        let count = self
            .tables
            .borrow()
            .paragraphs
            .values()
            .filter(|p| p.story_id == story_id && p.finished)
            .count();
        Ok(count as u32)
    }

    fn mark_paragraph_finished(&self, id: ParagraphId) -> Result<(), StoreError> {
        self.enter(StoreOp::MarkParagraphFinished)?;
        let mut tables = self.tables.borrow_mut();
        let paragraph = tables.paragraphs.get_mut(&id).ok_or(StoreError::Missing {
            kind: EntityKind::Paragraph,
            id,
        })?;
        paragraph.finished = true;
        Ok(())
    }

    fn unfinished_sentence(
        &self,
        paragraph_id: ParagraphId,
    ) -> Result<Option<Sentence>, StoreError> {
        self.enter(StoreOp::UnfinishedSentence)?;
        Ok(self
            .tables
            .borrow()
            .sentences
            .values()
            .find(|s| s.paragraph_id == paragraph_id && !s.finished)
            .cloned())
    }

    fn create_sentence(
        &self,
        paragraph_id: ParagraphId,
        word: &str,
        policy: &CapacityPolicy,
    ) -> Result<Sentence, StoreError> {
        self.enter(StoreOp::CreateSentence)?;
        let mut tables = self.tables.borrow_mut();
        if !tables.paragraphs.contains_key(&paragraph_id) {
            return Err(StoreError::Missing {
                kind: EntityKind::Paragraph,
                id: paragraph_id,
            });
        }
        let sentence = Sentence {
            id: tables.next_id(),
            paragraph_id,
            finished: policy.sentence_complete(1),
            content: word.to_string(),
        };
        tables.sentences.insert(sentence.id, sentence.clone());
        Ok(sentence)
    }

    fn append_to_sentence(
        &self,
        id: SentenceId,
        word: &str,
        policy: &CapacityPolicy,
    ) -> Result<Sentence, StoreError> {
        self.enter(StoreOp::AppendSentence)?;
        let mut tables = self.tables.borrow_mut();
        let sentence = tables.sentences.get_mut(&id).ok_or(StoreError::Missing {
            kind: EntityKind::Sentence,
            id,
        })?;
        if sentence.finished {
            return Err(StoreError::AlreadyFinished {
                kind: EntityKind::Sentence,
                id,
            });
        }
        sentence.content = join_word(&sentence.content, word);
        sentence.finished = policy.sentence_complete(word_count(&sentence.content));
        Ok(sentence.clone())
    }

    fn count_finished_sentences(&self, paragraph_id: ParagraphId) -> Result<u32, StoreError> {
        self.enter(StoreOp::CountFinishedSentences)?;
        let count = self
            .tables
            .borrow()
            .sentences
            .values()
            .filter(|s| s.paragraph_id == paragraph_id && s.finished)
            .count();
        Ok(count as u32)
    }
}

impl StoryCatalog for MemoryStore {
    fn count_stories(&self) -> Result<u64, StoreError> {
        Ok(self.tables.borrow().stories.len() as u64)
    }

    fn list_stories(&self, limit: u32, offset: u32) -> Result<Vec<Story>, StoreError> {
        Ok(self
            .tables
            .borrow()
            .stories
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn find_story(&self, id: StoryId) -> Result<Option<Story>, StoreError> {
        Ok(self.tables.borrow().stories.get(&id).cloned())
    }

    fn open_story(&self) -> Result<Option<Story>, StoreError> {
        Ok(first_open_story(&self.tables.borrow()))
    }

    fn story_paragraphs(&self, story_id: StoryId) -> Result<Vec<Paragraph>, StoreError> {
        Ok(self
            .tables
            .borrow()
            .paragraphs
            .values()
            .filter(|p| p.story_id == story_id)
            .cloned()
            .collect())
    }

    fn paragraph_sentences(&self, paragraph_id: ParagraphId) -> Result<Vec<Sentence>, StoreError> {
        Ok(self
            .tables
            .borrow()
            .sentences
            .values()
            .filter(|s| s.paragraph_id == paragraph_id)
            .cloned()
            .collect())
    }
}

fn first_open_story(tables: &Tables) -> Option<Story> {
    tables.stories.values().find(|s| !s.finished).cloned()
}

#[cfg(test)]
mod tests {
    use super::{Fault, MemoryStore, StoreOp};
    use crate::domain::capacity::CapacityPolicy;
    use crate::store::{StoreError, StoryCatalog, StoryStore, TransactionalStore};

    #[test]
    fn commit_keeps_writes_and_error_restores_snapshot() {
        let mut store = MemoryStore::new();
        let policy = CapacityPolicy::default();

        store
            .with_transaction(|tx| -> Result<(), StoreError> {
                let id = tx.create_story()?;
                tx.append_to_story_title(id, "Kept", &policy)?;
                Ok(())
            })
            .expect("first transaction should commit");

        let result: Result<(), StoreError> = store.with_transaction(|tx| {
            let story = tx.unfinished_story()?.expect("story should exist");
            tx.append_to_story_title(story.id, "Dropped", &policy)?;
            Err(StoreError::Unavailable("abort".to_string()))
        });
        assert!(result.is_err());

        let open = store.open_story().expect("lookup").expect("open story");
        assert_eq!(open.title, "Kept");
        assert!(!open.title_complete);
    }

    #[test]
    fn panic_inside_transaction_rolls_back() {
        let mut store = MemoryStore::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), StoreError> = store.with_transaction(|tx| {
                tx.create_story()?;
                panic!("boom");
            });
        }));
        assert!(outcome.is_err());
        assert_eq!(store.count_stories().expect("count"), 0);
    }

    #[test]
    fn injected_fault_fails_only_the_target_operation() {
        let mut store = MemoryStore::new();
        store.inject(Fault::FailOn(StoreOp::CreateParagraph));

        let result: Result<(), StoreError> = store.with_transaction(|tx| {
            let id = tx.create_story()?;
            tx.create_paragraph(id)?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.count_stories().expect("count"), 0);

        store.clear_fault();
        let result: Result<(), StoreError> = store.with_transaction(|tx| {
            let id = tx.create_story()?;
            tx.create_paragraph(id)?;
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(store.paragraphs().len(), 1);
    }

    #[test]
    fn lost_commit_ack_persists_state_but_reports_failure_once() {
        let mut store = MemoryStore::new();
        store.inject(Fault::LostCommitAck);

        let result: Result<i64, StoreError> = store.with_transaction(|tx| tx.create_story());
        assert!(result.is_err());
        assert_eq!(store.count_stories().expect("count"), 1);

        let result: Result<u32, StoreError> =
            store.with_transaction(|tx| tx.count_finished_paragraphs(1));
        assert!(result.is_ok());
    }

    #[test]
    fn counts_every_call() {
        let mut store = MemoryStore::new();
        assert_eq!(store.calls(), 0);
        let _: Result<_, StoreError> = store.with_transaction(|tx| tx.unfinished_story());
        assert_eq!(store.calls(), 3);
    }
}
