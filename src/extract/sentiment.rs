//! Valence scoring with the VADER lexicon and rules
//!
//! Proportions are rounded to 3 places and the compound score to 4, matching
//! the values the reference analyzer reports.

use serde::{Deserialize, Serialize};
use vader_sentiment::SentimentIntensityAnalyzer;

/// Valence proportions and compound score of a text
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentScores {
    pub neg: f64,
    pub neu: f64,
    pub pos: f64,
    pub compound: f64,
}

/// Rule-based valence analyzer over the full VADER lexicon
///
/// The lexicon is loaded once per process by `vader_sentiment`, so the
/// analyzer itself carries no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentAnalyzer;

fn round_to(x: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (x * f).round() / f
}

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn polarity_scores(&self, text: &str) -> SentimentScores {
        if text.trim().is_empty() {
            return SentimentScores::default();
        }
        let analyzer = SentimentIntensityAnalyzer::new();
        let scores = analyzer.polarity_scores(text);
        let get = |key: &str| scores.get(key).copied().unwrap_or(0.0);
        SentimentScores {
            neg: round_to(get("neg"), 3),
            neu: round_to(get("neu"), 3),
            pos: round_to(get("pos"), 3),
            compound: round_to(get("compound"), 4),
        }
    }
}
