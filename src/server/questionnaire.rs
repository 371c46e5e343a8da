//! PHQ-8 questionnaire scoring

use serde::Serialize;

use super::error::{Result, ServerError};

pub const ITEM_COUNT: usize = 8;
pub const MAX_ITEM_SCORE: i64 = 3;
pub const MAX_SCORE: i64 = ITEM_COUNT as i64 * MAX_ITEM_SCORE;
/// Totals at or above this are screened as depressed
pub const DEPRESSION_CUTOFF: i64 = 10;

/// Severity band of a questionnaire total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Minimal,
    Mild,
    Moderate,
    #[serde(rename = "Moderately Severe")]
    ModeratelySevere,
    Severe,
}

impl Severity {
    pub fn from_score(score: i64) -> Self {
        match score {
            s if s <= 4 => Severity::Minimal,
            s if s <= 9 => Severity::Mild,
            s if s <= 14 => Severity::Moderate,
            s if s <= 19 => Severity::ModeratelySevere,
            _ => Severity::Severe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minimal => "Minimal",
            Severity::Mild => "Mild",
            Severity::Moderate => "Moderate",
            Severity::ModeratelySevere => "Moderately Severe",
            Severity::Severe => "Severe",
        }
    }
}

/// Scored questionnaire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionnaireScore {
    pub score: i64,
    pub severity: Severity,
    pub depressed: bool,
}

impl QuestionnaireScore {
    pub fn from_total(score: i64) -> Self {
        Self {
            score,
            severity: Severity::from_score(score),
            depressed: score >= DEPRESSION_CUTOFF,
        }
    }

    /// Score a complete set of item responses
    pub fn from_answers(answers: &[i64]) -> Result<Self> {
        if answers.len() != ITEM_COUNT {
            return Err(ServerError::BadRequest(format!(
                "Expected {} answers, got {}",
                ITEM_COUNT,
                answers.len()
            )));
        }
        Self::from_partial(answers)
    }

    /// Score whatever responses were given; an empty list totals 0
    pub fn from_partial(answers: &[i64]) -> Result<Self> {
        if answers.len() > ITEM_COUNT {
            return Err(ServerError::BadRequest(format!(
                "At most {} answers are accepted, got {}",
                ITEM_COUNT,
                answers.len()
            )));
        }
        if let Some((i, a)) = answers
            .iter()
            .enumerate()
            .find(|(_, a)| !(0..=MAX_ITEM_SCORE).contains(*a))
        {
            return Err(ServerError::BadRequest(format!(
                "Answer {} is {}; each answer must be between 0 and {}",
                i + 1,
                a,
                MAX_ITEM_SCORE
            )));
        }
        Ok(Self::from_total(answers.iter().sum()))
    }

    /// Total scaled to `[0, 1]`
    pub fn normalized(&self) -> f64 {
        (self.score as f64 / MAX_SCORE as f64).min(1.0)
    }
}
