use std::fmt;

use thiserror::Error;
use tracing::error;

use crate::domain::word::WordError;
use crate::locks::LockError;
use crate::store::StoreError;

/// Step of an append that a storage failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Story,
    Title,
    Paragraph,
    Sentence,
    Cascade,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Story => "story",
            Stage::Title => "title",
            Stage::Paragraph => "paragraph",
            Stage::Sentence => "sentence",
            Stage::Cascade => "cascade",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid word: {0}")]
    InvalidWord(#[from] WordError),
    #[error("storage unavailable at {stage} stage: {source}")]
    StorageUnavailable {
        stage: Stage,
        #[source]
        source: StoreError,
    },
    #[error("inconsistent story state at {stage} stage: {source}")]
    InconsistentState {
        stage: Stage,
        #[source]
        source: StoreError,
    },
    /// Begin or commit failed. When it is the commit, the writes may or may
    /// not have landed.
    #[error("transaction failed: {0}")]
    TransactionFailed(#[from] StoreError),
    #[error("append lock unavailable: {0}")]
    Lock(#[from] LockError),
}

impl EngineError {
    pub(crate) fn at(stage: Stage, source: StoreError) -> Self {
        if source.is_inconsistency() {
            error!(stage = stage.as_str(), error = %source, "story hierarchy is inconsistent");
            EngineError::InconsistentState { stage, source }
        } else {
            EngineError::StorageUnavailable { stage, source }
        }
    }

    /// Whether the caller may resubmit the same word. Resubmission after a
    /// failed commit can append the word twice.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StorageUnavailable { .. }
                | EngineError::TransactionFailed(_)
                | EngineError::Lock(_)
        )
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            EngineError::StorageUnavailable { stage, .. }
            | EngineError::InconsistentState { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
