//! Prompt catalog: fixed prompt lists per game mode.

use crate::types::GameMode;
use rand::seq::IndexedRandom;
use std::collections::HashSet;

/// Finish the Sentence
pub const SENTENCE_PROMPTS: &[&str] = &[
    "I act confident but actually ___",
    "People think I'm chill but ___",
    "I disappear when ___",
    "I say 'I'm fine' when ___",
    "I get defensive when ___",
    "Something I pretend not to care about is ___",
    "I avoid talking about ___",
    "I secretly want ___",
    "I shut down when ___",
    "I'm scared people will notice ___",
];

/// Drop It (image answers)
pub const DROP_IT_PROMPTS: &[&str] = &[
    "Drop your home screen",
    "Drop your lock screen",
    "Drop the last photo you took",
    "Drop the last meme you saved",
    "Drop a song you're currently overplaying",
    "Drop a song that matches your mood",
    "Drop a screenshot that explains your week",
    "Drop your most used app",
    "Drop something that feels very 'you'",
];

/// No Context (one word or emoji)
pub const CONTEXT_PROMPTS: &[&str] = &[
    "How are you actually doing?",
    "Your current mood",
    "What's draining you?",
    "What are you avoiding?",
    "Your energy level this week",
    "How life feels right now",
    "Your stress level",
    "What you need more of",
    "Your mindset lately",
];

pub fn prompts_for_mode(mode: GameMode) -> &'static [&'static str] {
    match mode {
        GameMode::Sentence => SENTENCE_PROMPTS,
        GameMode::Drop => DROP_IT_PROMPTS,
        GameMode::Context => CONTEXT_PROMPTS,
    }
}

pub fn prompt_count(mode: GameMode) -> usize {
    prompts_for_mode(mode).len()
}

/// Prompt text, `None` when the index is out of range
pub fn prompt(mode: GameMode, index: usize) -> Option<&'static str> {
    prompts_for_mode(mode).get(index).copied()
}

/// Whether every prompt of `mode` appears in `used`
pub fn is_exhausted(mode: GameMode, used: &HashSet<usize>) -> bool {
    (0..prompt_count(mode)).all(|i| used.contains(&i))
}

/// Pick a random index not in `used`; `None` once all prompts are used
pub fn unused_prompt_index(mode: GameMode, used: &HashSet<usize>) -> Option<usize> {
    let available: Vec<usize> = (0..prompt_count(mode))
        .filter(|i| !used.contains(i))
        .collect();
    available.choose(&mut rand::rng()).copied()
}
