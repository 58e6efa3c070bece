use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::config::{Config, ConfigError};
use crate::domain::model::StoryId;
use crate::engine::{AppendOutcome, Engine, EngineError, EngineOptions, Stage};
use crate::locks::LockFile;
use crate::metrics::{AppendCounters, CounterSnapshot};
use crate::query::{self, StoryBrief, StoryDetail, StoryPage};
use crate::store::sqlite::SqliteStore;
use crate::store::StoreError;

pub struct App {
    engine: Engine<SqliteStore, Option<LockFile>>,
    counters: Arc<AppendCounters>,
}

impl App {
    pub fn open(
        db_path: &str,
        lock_file: Option<PathBuf>,
        config: &Config,
    ) -> Result<Self, AppError> {
        ensure_parent_dir(db_path)?;
        let store = SqliteStore::open(db_path, config.busy_timeout())?;
        let section = lock_file.map(|path| LockFile::new(path, config.lock_timeout()));
        let counters = Arc::new(AppendCounters::default());
        let engine = Engine::with_section(store, section, config.engine_options())
            .with_observer(counters.clone());
        debug!(db_path, "story store opened");
        Ok(Self { engine, counters })
    }

    pub fn add_word(&self, word: &str) -> Result<AppendOutcome, AppError> {
        Ok(self.engine.append_word(word)?)
    }

    pub fn list_stories(&self, limit: u32, offset: u32) -> Result<StoryPage, AppError> {
        Ok(self
            .engine
            .read(|store| query::list_stories(store, limit, offset))?)
    }

    pub fn show_story(&self, id: StoryId) -> Result<StoryDetail, AppError> {
        self.engine
            .read(|store| query::story_detail(store, id))?
            .ok_or(AppError::NotFound(id))
    }

    pub fn open_story(&self) -> Result<Option<StoryBrief>, AppError> {
        Ok(self.engine.read(|store| query::open_story(store))?)
    }

    pub fn options(&self) -> &EngineOptions {
        self.engine.options()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }
}

fn ensure_parent_dir(path: &str) -> Result<(), AppError> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("story {0} not found")]
    NotFound(StoryId),
}

impl AppError {
    /// Append stage a storage failure is attributed to.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AppError::Engine(err) => err.stage(),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Engine(err) if err.is_retryable())
    }

    /// Extra stderr lines printed after the error itself.
    pub fn report_details(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(stage) = self.stage() {
            lines.push(format!("failed stage: {stage}"));
        }
        if self.is_retryable() {
            lines.push("retryable: the word can be resubmitted".to_string());
        }
        if matches!(self, AppError::Engine(EngineError::TransactionFailed(_))) {
            lines.push(
                "the commit may have landed; resubmitting can append the word twice".to_string(),
            );
        }
        lines
    }
}
