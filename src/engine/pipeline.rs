//! One append, as explicit transitions: resolve where the word goes, place
//! it, then cascade finalization upward. Runs inside a single transaction.

use tracing::{debug, info};

use super::error::{EngineError, Stage};
use super::{AppendOutcome, Finalized};
use crate::domain::capacity::CapacityPolicy;
use crate::domain::model::{Paragraph, Sentence, Story};
use crate::store::{EntityKind, StoreError, StoryStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Placement {
    NewStory,
    TitleWord(Story),
    NewParagraph(Story),
    NewSentence {
        story: Story,
        paragraph: Paragraph,
    },
    ExtendSentence {
        story: Story,
        sentence: Sentence,
    },
}

impl Placement {
    fn label(&self) -> &'static str {
        match self {
            Placement::NewStory => "new_story",
            Placement::TitleWord(_) => "title_word",
            Placement::NewParagraph(_) => "new_paragraph",
            Placement::NewSentence { .. } => "new_sentence",
            Placement::ExtendSentence { .. } => "extend_sentence",
        }
    }
}

pub(crate) fn resolve(store: &dyn StoryStore) -> Result<Placement, EngineError> {
    let Some(story) = store
        .unfinished_story()
        .map_err(|err| EngineError::at(Stage::Story, err))?
    else {
        return Ok(Placement::NewStory);
    };
    if !story.title_complete {
        return Ok(Placement::TitleWord(story));
    }

    let Some(paragraph) = store
        .unfinished_paragraph(story.id)
        .map_err(|err| EngineError::at(Stage::Paragraph, err))?
    else {
        return Ok(Placement::NewParagraph(story));
    };

    match store
        .unfinished_sentence(paragraph.id)
        .map_err(|err| EngineError::at(Stage::Sentence, err))?
    {
        Some(sentence) => Ok(Placement::ExtendSentence { story, sentence }),
        None => Ok(Placement::NewSentence { story, paragraph }),
    }
}

pub(crate) fn append(
    store: &dyn StoryStore,
    policy: &CapacityPolicy,
    word: &str,
) -> Result<AppendOutcome, EngineError> {
    let placement = resolve(store)?;
    debug!(placement = placement.label(), "resolved placement");

    let (story, sentence) = match placement {
        Placement::NewStory => {
            let id = store
                .create_story()
                .map_err(|err| EngineError::at(Stage::Story, err))?;
            debug!(story_id = id, "opened new story");
            return title_word(store, policy, id, word);
        }
        Placement::TitleWord(story) => return title_word(store, policy, story.id, word),
        Placement::NewParagraph(story) => {
            let paragraph_id = store
                .create_paragraph(story.id)
                .map_err(|err| EngineError::at(Stage::Paragraph, err))?;
            debug!(story_id = story.id, paragraph_id, "opened new paragraph");
            let sentence = store
                .create_sentence(paragraph_id, word, policy)
                .map_err(|err| EngineError::at(Stage::Sentence, err))?;
            (story, sentence)
        }
        Placement::NewSentence { story, paragraph } => {
            let sentence = store
                .create_sentence(paragraph.id, word, policy)
                .map_err(|err| EngineError::at(Stage::Sentence, err))?;
            (story, sentence)
        }
        Placement::ExtendSentence { story, sentence } => {
            let sentence = store
                .append_to_sentence(sentence.id, word, policy)
                .map_err(|err| EngineError::at(Stage::Sentence, err))?;
            (story, sentence)
        }
    };

    let finalized = if sentence.finished {
        debug!(sentence_id = sentence.id, "sentence finished");
        cascade(store, policy, &story, &sentence)?
    } else {
        Finalized::default()
    };

    store
        .touch_story(story.id)
        .map_err(|err| EngineError::at(Stage::Story, err))?;

    Ok(AppendOutcome {
        story_id: story.id,
        title: story.title,
        current_sentence: sentence.content,
        finalized,
    })
}

fn title_word(
    store: &dyn StoryStore,
    policy: &CapacityPolicy,
    story_id: i64,
    word: &str,
) -> Result<AppendOutcome, EngineError> {
    let story = store
        .append_to_story_title(story_id, word, policy)
        .map_err(|err| EngineError::at(Stage::Title, err))?;
    if story.title_complete {
        debug!(story_id, title = %story.title, "title complete");
    }
    Ok(AppendOutcome {
        story_id: story.id,
        title: story.title,
        current_sentence: String::new(),
        finalized: Finalized::default(),
    })
}

/// Promotes a just-finished sentence's paragraph, and then its story, when
/// their capacities are reached. Parents are re-read so a row that vanished
/// under the transaction is reported instead of written through.
fn cascade(
    store: &dyn StoryStore,
    policy: &CapacityPolicy,
    story: &Story,
    sentence: &Sentence,
) -> Result<Finalized, EngineError> {
    let mut finalized = Finalized {
        sentence: true,
        ..Finalized::default()
    };

    let finished_sentences = store
        .count_finished_sentences(sentence.paragraph_id)
        .map_err(|err| EngineError::at(Stage::Cascade, err))?;
    if !policy.paragraph_complete(finished_sentences) {
        return Ok(finalized);
    }

    let paragraph = store
        .paragraph(sentence.paragraph_id)
        .map_err(|err| EngineError::at(Stage::Cascade, err))?
        .ok_or_else(|| missing(EntityKind::Paragraph, sentence.paragraph_id))?;
    if paragraph.finished {
        return Ok(finalized);
    }
    store
        .mark_paragraph_finished(paragraph.id)
        .map_err(|err| EngineError::at(Stage::Cascade, err))?;
    finalized.paragraph = true;
    debug!(paragraph_id = paragraph.id, finished_sentences, "paragraph finished");

    let finished_paragraphs = store
        .count_finished_paragraphs(story.id)
        .map_err(|err| EngineError::at(Stage::Cascade, err))?;
    if !policy.story_complete(finished_paragraphs) {
        return Ok(finalized);
    }

    let current = store
        .story(story.id)
        .map_err(|err| EngineError::at(Stage::Cascade, err))?
        .ok_or_else(|| missing(EntityKind::Story, story.id))?;
    if current.finished {
        return Ok(finalized);
    }
    store
        .mark_story_finished(current.id)
        .map_err(|err| EngineError::at(Stage::Cascade, err))?;
    finalized.story = true;
    info!(story_id = current.id, title = %current.title, "story finished");

    Ok(finalized)
}

fn missing(kind: EntityKind, id: i64) -> EngineError {
    EngineError::at(Stage::Cascade, StoreError::Missing { kind, id })
}
