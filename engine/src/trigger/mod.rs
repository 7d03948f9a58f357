//! Response Trigger Engine
//!
//! Decides whether an inbound message gets a reply:
//!
//! 1. the text names the bot (case-insensitive substring match), or
//! 2. the message replies to something the bot said, or
//! 3. Persona mode only: a uniform draw in `[0, 1)` lands under 0.02.
//!
//! The draw is the only nondeterminism and comes from a [`RandomSource`], so
//! tests can force either branch.

use rand::Rng;

use crate::mode::Mode;

/// Case-insensitive substrings that address the bot
pub const TRIGGER_WORDS: &[&str] = &["raiden", "ei", "@raiden", "@ei"];

/// Probability of an unprompted reply in Persona mode
pub const SPONTANEOUS_REPLY_CHANCE: f64 = 0.02;

/// Source of uniform samples in `[0, 1)`
pub trait RandomSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Always returns the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Why the engine decided to reply, or not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    Mentioned,
    ReplyToBot,
    Spontaneous,
    Silent,
}

impl TriggerDecision {
    pub fn responds(&self) -> bool {
        !matches!(self, TriggerDecision::Silent)
    }
}

/// Whether the text names the bot
pub fn is_bot_mentioned(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    TRIGGER_WORDS.iter().any(|word| lower.contains(word))
}

pub struct TriggerEngine {
    random: Box<dyn RandomSource>,
}

impl TriggerEngine {
    pub fn new(random: Box<dyn RandomSource>) -> Self {
        Self { random }
    }

    pub fn should_respond(&self, text: &str, is_reply_to_bot: bool, mode: Mode) -> TriggerDecision {
        if is_bot_mentioned(text) {
            return TriggerDecision::Mentioned;
        }
        if is_reply_to_bot {
            return TriggerDecision::ReplyToBot;
        }
        if mode.profile().spontaneous && self.random.sample() < SPONTANEOUS_REPLY_CHANCE {
            return TriggerDecision::Spontaneous;
        }
        TriggerDecision::Silent
    }
}

impl Default for TriggerEngine {
    fn default() -> Self {
        Self::new(Box::new(ThreadRandom))
    }
}

impl std::fmt::Debug for TriggerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerEngine").finish_non_exhaustive()
    }
}
