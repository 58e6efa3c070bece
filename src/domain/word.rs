use thiserror::Error;

/// Upper bound on word length, in characters, unless configured otherwise.
pub const DEFAULT_MAX_WORD_CHARS: usize = 240;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WordError {
    #[error("word cannot be empty")]
    Empty,
    #[error("word is {len} characters long; the limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("'{0}' is not a single word; whitespace is not allowed")]
    Whitespace(String),
}

pub fn validate_word(word: &str, max_chars: usize) -> Result<(), WordError> {
    if word.is_empty() {
        return Err(WordError::Empty);
    }
    let len = word.chars().count();
    if len > max_chars {
        return Err(WordError::TooLong {
            len,
            max: max_chars,
        });
    }
    if word.chars().any(char::is_whitespace) {
        return Err(WordError::Whitespace(word.to_string()));
    }
    Ok(())
}
