//! Fixed-weight combination used by the serving endpoint
//!
//! These weights are a hand-set online heuristic and are independent of the
//! validation-AUC weights learned by late fusion.

use crate::fusion::FusionResult;

pub const QUESTIONNAIRE_WEIGHT: f64 = 0.35;
pub const TEXT_WEIGHT: f64 = 0.35;
pub const VISUAL_WEIGHT: f64 = 0.30;
/// Probability used for text too short to score
pub const NEUTRAL_PROBABILITY: f64 = 0.5;
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Combine questionnaire, text and, when present, visual evidence
pub fn combine(questionnaire: f64, text: f64, visual: Option<f64>) -> FusionResult {
    let probability = match visual {
        Some(v) => QUESTIONNAIRE_WEIGHT * questionnaire + TEXT_WEIGHT * text + VISUAL_WEIGHT * v,
        None => 0.5 * questionnaire + 0.5 * text,
    };
    FusionResult::from_probability(probability, DECISION_THRESHOLD)
}

pub fn round4(x: f64) -> f64 {
    (x * 1e4).round() / 1e4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::RiskTier;

    #[test]
    fn test_two_way_boundary() {
        let r = combine(0.5, 0.5, None);
        assert!((r.probability - 0.5).abs() < 1e-12);
        assert_eq!(r.risk_tier, RiskTier::Moderate);
        assert!(r.prediction);
    }

    #[test]
    fn test_three_way() {
        let r = combine(0.5, 0.5, Some(0.8));
        assert_eq!(round4(r.probability), 0.59);
        assert_eq!(r.risk_tier, RiskTier::Moderate);
        assert!(r.prediction);

        let high = combine(1.0, 0.9, Some(0.9));
        assert_eq!(high.risk_tier, RiskTier::High);
        let low = combine(0.0, 0.2, None);
        assert_eq!(low.risk_tier, RiskTier::Low);
        assert!(!low.prediction);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(0.5), 0.5);
    }
}
