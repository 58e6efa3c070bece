use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE_WORDS: u32 = 2;
pub const DEFAULT_SENTENCE_WORDS: u32 = 15;
pub const DEFAULT_PARAGRAPH_SENTENCES: u32 = 10;
pub const DEFAULT_STORY_PARAGRAPHS: u32 = 7;

/// Thresholds at which each container level stops accepting children.
///
/// Titles and sentences are measured in words; paragraphs count their finished
/// sentences and stories count their finished paragraphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapacityPolicy {
    pub title_words: u32,
    pub sentence_words: u32,
    pub paragraph_sentences: u32,
    pub story_paragraphs: u32,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            title_words: DEFAULT_TITLE_WORDS,
            sentence_words: DEFAULT_SENTENCE_WORDS,
            paragraph_sentences: DEFAULT_PARAGRAPH_SENTENCES,
            story_paragraphs: DEFAULT_STORY_PARAGRAPHS,
        }
    }
}

impl CapacityPolicy {
    pub fn title_complete(&self, word_count: u32) -> bool {
        word_count >= self.title_words
    }

    pub fn sentence_complete(&self, word_count: u32) -> bool {
        word_count >= self.sentence_words
    }

    pub fn paragraph_complete(&self, finished_sentences: u32) -> bool {
        finished_sentences >= self.paragraph_sentences
    }

    pub fn story_complete(&self, finished_paragraphs: u32) -> bool {
        finished_paragraphs >= self.story_paragraphs
    }

    /// Returns the name of the first threshold that is zero, if any.
    pub fn zero_threshold(&self) -> Option<&'static str> {
        [
            ("title_words", self.title_words),
            ("sentence_words", self.sentence_words),
            ("paragraph_sentences", self.paragraph_sentences),
            ("story_paragraphs", self.story_paragraphs),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0)
        .map(|(name, _)| name)
    }

    /// Words a story holds in its sentences once it is finished.
    #[cfg(test)]
    pub fn words_per_story(&self) -> u64 {
        u64::from(self.sentence_words)
            * u64::from(self.paragraph_sentences)
            * u64::from(self.story_paragraphs)
    }
}

pub fn word_count(content: &str) -> u32 {
    content.split_whitespace().count() as u32
}
