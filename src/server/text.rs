//! Serve-time text features
//!
//! No fitted vectorizer exists online, so the term-weight slots of the
//! training layout stay zero and the transcription confidence is 0.

use ndarray::Array2;

use crate::error::{DepFusionError, Result};
use crate::extract::{SentimentAnalyzer, TextFeatures, BASE_FEATURE_NAMES, MIN_TEXT_CHARS};

/// Whether `text` carries enough content to score
pub fn is_scorable(text: &str) -> bool {
    text.trim().chars().count() >= MIN_TEXT_CHARS
}

/// Surface features of free text with no confidence information
pub fn serve_features(analyzer: &SentimentAnalyzer, text: &str) -> TextFeatures {
    TextFeatures::compute(analyzer, text, 0.0)
}

/// One-row matrix of `width` columns: base features then zeros
pub fn serve_vector(features: &TextFeatures, width: usize) -> Result<Array2<f64>> {
    let base = features.to_vec();
    if width < base.len() {
        return Err(DepFusionError::ShapeError {
            expected: format!("at least {} text features", BASE_FEATURE_NAMES.len()),
            actual: format!("{} features", width),
        });
    }
    let mut row = Array2::<f64>::zeros((1, width));
    for (j, v) in base.into_iter().enumerate() {
        row[[0, j]] = v;
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scorable_uses_stripped_length() {
        assert!(!is_scorable("   short   "));
        assert!(is_scorable("  ten chars!"));
        assert!(!is_scorable(""));
    }

    #[test]
    fn test_vector_layout() {
        let sia = SentimentAnalyzer::new();
        let features = serve_features(&sia, "I have been feeling tired and sad");
        let row = serve_vector(&features, 59).unwrap();
        assert_eq!(row.dim(), (1, 59));
        assert_eq!(row[[0, 4]], 7.0);
        assert_eq!(row[[0, 8]], 0.0);
        assert!(row.iter().skip(9).all(|v| *v == 0.0));
        assert!(row[[0, 3]] < 0.0);
    }

    #[test]
    fn test_narrow_model_rejected() {
        let features = TextFeatures::default();
        assert!(serve_vector(&features, 5).is_err());
    }
}
