//! Answer validation, the text classifier seam and image content addressing

use crate::config::GameConfig;
use crate::error::{GameError, GameResult};
use crate::types::{GameMode, RoomCode};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::RwLock;

/// Black-box disallowed-language check
pub trait TextClassifier: Send + Sync {
    fn is_disallowed(&self, text: &str) -> bool;
}

/// Classifier that accepts everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl TextClassifier for AllowAll {
    fn is_disallowed(&self, _text: &str) -> bool {
        false
    }
}

/// Case-insensitive whole-word block list
#[derive(Debug, Default)]
pub struct WordListFilter {
    words: RwLock<HashSet<String>>,
}

impl WordListFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filter = Self::default();
        filter.add_words(words);
        filter
    }

    pub fn add_words<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = self.words.write().unwrap_or_else(|e| e.into_inner());
        set.extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
    }

    /// Allow words that turned out to be false positives
    pub fn remove_words<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = self.words.write().unwrap_or_else(|e| e.into_inner());
        for word in words {
            set.remove(&word.as_ref().to_lowercase());
        }
    }

    /// Blocked words found in `text`, in order of appearance
    pub fn matches(&self, text: &str) -> Vec<String> {
        let set = self.words.read().unwrap_or_else(|e| e.into_inner());
        tokenize(text).filter(|w| set.contains(w)).collect()
    }
}

impl TextClassifier for WordListFilter {
    fn is_disallowed(&self, text: &str) -> bool {
        let set = self.words.read().unwrap_or_else(|e| e.into_inner());
        tokenize(text).any(|w| set.contains(&w))
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

fn is_pictographic(c: char) -> bool {
    matches!(c as u32,
        0x1F000..=0x1FAFF
        | 0x2600..=0x27BF
        | 0x2300..=0x23FF
        | 0x2B00..=0x2BFF
        | 0x2190..=0x21FF
        | 0x3030 | 0x303D | 0x3297 | 0x3299
        | 0x00A9 | 0x00AE | 0x203C | 0x2049 | 0x2122 | 0x2139
    )
}

fn is_emoji_component(c: char) -> bool {
    matches!(c as u32,
        0x200D            // zero width joiner
        | 0xFE0F          // variation selector 16
        | 0x20E3          // combining keycap
        | 0x1F3FB..=0x1F3FF // skin tones
        | 0x1F1E6..=0x1F1FF // regional indicators
        | 0xE0020..=0xE007F // tags
    )
}

/// Whether `text` consists only of emoji (including ZWJ sequences, flags and keycaps)
pub fn is_emoji_sequence(text: &str) -> bool {
    let mut has_pictograph = false;
    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if is_pictographic(c) {
            has_pictograph = true;
        } else if is_emoji_component(c) {
            continue;
        } else if (c.is_ascii_digit() || c == '#' || c == '*')
            && chars.get(i + 1..i + 3) == Some(&['\u{FE0F}', '\u{20E3}'][..])
        {
            has_pictograph = true;
        } else {
            return false;
        }
    }
    has_pictograph
}

/// Validate a text answer for `mode`, returning the trimmed content to store
pub fn validate_answer(
    mode: GameMode,
    text: &str,
    config: &GameConfig,
    classifier: &dyn TextClassifier,
) -> GameResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GameError::validation("Please enter your answer"));
    }

    match mode {
        GameMode::Sentence => {
            if trimmed.chars().count() > config.sentence_max_chars {
                return Err(GameError::validation(format!(
                    "Maximum {} characters",
                    config.sentence_max_chars
                )));
            }
            if classifier.is_disallowed(trimmed) {
                return Err(GameError::validation("Please rephrase your answer"));
            }
        }
        GameMode::Context => {
            if trimmed.split_whitespace().count() > 1 {
                return Err(GameError::validation("One word or one emoji only"));
            }
            if !is_emoji_sequence(trimmed) {
                if trimmed.chars().count() > config.context_max_chars {
                    return Err(GameError::validation("One word or one emoji only"));
                }
                if classifier.is_disallowed(trimmed) {
                    return Err(GameError::validation("Please use a different word"));
                }
            }
        }
        GameMode::Drop => {
            return Err(GameError::validation("This round needs an image"));
        }
    }

    Ok(trimmed.to_string())
}

/// Validate an already compressed image payload
pub fn validate_image(bytes: &[u8], config: &GameConfig) -> GameResult<()> {
    if bytes.is_empty() {
        return Err(GameError::validation("Please select an image"));
    }
    let limit = config.drop_it_max_size_kb * 1024;
    if bytes.len() > limit {
        return Err(GameError::validation(format!(
            "Image must be {} KB or less",
            config.drop_it_max_size_kb
        )));
    }
    Ok(())
}

/// Storage path for an uploaded Drop It image
pub fn content_address(room: &RoomCode, bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("drop-it/{}/{}.jpg", room, hex::encode(digest))
}
