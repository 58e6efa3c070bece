use serde::Serialize;

pub type StoryId = i64;
pub type ParagraphId = i64;
pub type SentenceId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Story {
    pub id: StoryId,
    pub title: String,
    pub title_complete: bool,
    pub finished: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paragraph {
    pub id: ParagraphId,
    pub story_id: StoryId,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sentence {
    pub id: SentenceId,
    pub paragraph_id: ParagraphId,
    pub finished: bool,
    pub content: String,
}

/// Appends `word` to a space-joined run of words.
pub fn join_word(content: &str, word: &str) -> String {
    if content.is_empty() {
        word.to_string()
    } else {
        format!("{content} {word}")
    }
}
