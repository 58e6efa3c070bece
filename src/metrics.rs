use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::engine::{AppendOutcome, EngineError};

/// Sink the engine reports every append to, successful or not.
pub trait AppendObserver: Send + Sync {
    fn appended(&self, outcome: &AppendOutcome, elapsed: Duration);
    fn failed(&self, error: &EngineError, elapsed: Duration);
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl AppendObserver for NoopObserver {
    fn appended(&self, _outcome: &AppendOutcome, _elapsed: Duration) {}
    fn failed(&self, _error: &EngineError, _elapsed: Duration) {}
}

#[derive(Debug, Default)]
pub struct AppendCounters {
    appended: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    sentences_finished: AtomicU64,
    paragraphs_finished: AtomicU64,
    stories_finished: AtomicU64,
    elapsed_micros: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub appended: u64,
    pub rejected: u64,
    pub failed: u64,
    pub sentences_finished: u64,
    pub paragraphs_finished: u64,
    pub stories_finished: u64,
    pub elapsed_micros: u64,
}

impl AppendCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            appended: self.appended.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            sentences_finished: self.sentences_finished.load(Ordering::Relaxed),
            paragraphs_finished: self.paragraphs_finished.load(Ordering::Relaxed),
            stories_finished: self.stories_finished.load(Ordering::Relaxed),
            elapsed_micros: self.elapsed_micros.load(Ordering::Relaxed),
        }
    }

    fn add_elapsed(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.elapsed_micros.fetch_add(micros, Ordering::Relaxed);
    }
}

impl AppendObserver for AppendCounters {
    fn appended(&self, outcome: &AppendOutcome, elapsed: Duration) {
        self.appended.fetch_add(1, Ordering::Relaxed);
        let finalized = outcome.finalized;
        if finalized.sentence {
            self.sentences_finished.fetch_add(1, Ordering::Relaxed);
        }
        if finalized.paragraph {
            self.paragraphs_finished.fetch_add(1, Ordering::Relaxed);
        }
        if finalized.story {
            self.stories_finished.fetch_add(1, Ordering::Relaxed);
        }
        self.add_elapsed(elapsed);
        debug!(
            story_id = outcome.story_id,
            elapsed_us = elapsed.as_micros() as u64,
            "word appended"
        );
    }

    fn failed(&self, error: &EngineError, elapsed: Duration) {
        if matches!(error, EngineError::InvalidWord(_)) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.add_elapsed(elapsed);
    }
}
