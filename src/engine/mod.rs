//! The append engine: places one word into the active story hierarchy and
//! finalizes containers that reach capacity.
//!
//! Every call re-resolves the active containers from the store, so the
//! engine holds no cursor of its own and survives restarts. Calls are
//! serialized: the store sits behind a mutex, and an optional
//! [`CriticalSection`] extends the exclusion across processes.
//!
//! Resubmitting a word after [`EngineError::TransactionFailed`] is not
//! idempotent. If the commit landed but its acknowledgement did not, the word
//! is appended twice.

mod error;
mod pipeline;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tracing::instrument;

pub use error::{EngineError, Stage};

use crate::domain::capacity::CapacityPolicy;
use crate::domain::model::StoryId;
use crate::domain::word::{validate_word, DEFAULT_MAX_WORD_CHARS};
use crate::locks::CriticalSection;
#[cfg(test)]
use crate::locks::InProcess;
use crate::metrics::{AppendObserver, NoopObserver};
use crate::store::TransactionalStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub policy: CapacityPolicy,
    pub max_word_chars: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            policy: CapacityPolicy::default(),
            max_word_chars: DEFAULT_MAX_WORD_CHARS,
        }
    }
}

/// Which containers a single append finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Finalized {
    pub sentence: bool,
    pub paragraph: bool,
    pub story: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    #[serde(rename = "id")]
    pub story_id: StoryId,
    pub title: String,
    pub current_sentence: String,
    pub finalized: Finalized,
}

pub struct Engine<S, L> {
    store: Mutex<S>,
    section: L,
    options: EngineOptions,
    observer: Arc<dyn AppendObserver>,
}

#[cfg(test)]
impl<S: TransactionalStore> Engine<S, InProcess> {
    pub fn new(store: S, options: EngineOptions) -> Self {
        Self::with_section(store, InProcess, options)
    }
}

impl<S: TransactionalStore, L: CriticalSection> Engine<S, L> {
    pub fn with_section(store: S, section: L, options: EngineOptions) -> Self {
        Self {
            store: Mutex::new(store),
            section,
            options,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AppendObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    #[instrument(level = "debug", skip(self))]
    pub fn append_word(&self, word: &str) -> Result<AppendOutcome, EngineError> {
        let started = Instant::now();
        let result = self.append_serialized(word);
        match &result {
            Ok(outcome) => self.observer.appended(outcome, started.elapsed()),
            Err(err) => self.observer.failed(err, started.elapsed()),
        }
        result
    }

    fn append_serialized(&self, word: &str) -> Result<AppendOutcome, EngineError> {
        validate_word(word, self.options.max_word_chars)?;

        let mut store = self.lock_store();
        let _section = self.section.enter()?;
        let policy = self.options.policy;
        store.with_transaction(|tx| pipeline::append(tx, &policy, word))
    }

    /// Read access to the store, serialized with appends.
    pub fn read<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&self.lock_store())
    }

    #[cfg(test)]
    pub fn into_store(self) -> S {
        self.store
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // A panicking append already rolled its transaction back, so a poisoned
    // lock still guards a consistent store.
    fn lock_store(&self) -> MutexGuard<'_, S> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
