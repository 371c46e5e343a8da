//! Transcript features: surface statistics, sentiment and TF-IDF terms

use super::sentiment::{SentimentAnalyzer, SentimentScores};
use super::{DataSource, FeatureRecord};
use crate::data::column_f64;
use crate::error::{DepFusionError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{info, warn};

/// Substituted when a transcript has too little usable text
pub const PLACEHOLDER_TEXT: &str = "no text available";

/// Stripped texts shorter than this are treated as empty
pub const MIN_TEXT_CHARS: usize = 10;

/// Names of the surface and sentiment features, in column order
pub const BASE_FEATURE_NAMES: [&str; 9] = [
    "sent_neg",
    "sent_neu",
    "sent_pos",
    "sent_compound",
    "word_count",
    "unique_words",
    "lexical_div",
    "avg_word_len",
    "avg_conf",
];

const ENGLISH_STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
    "nor", "not", "only", "own", "same", "so", "than", "too", "very", "can", "will", "just",
    "don", "should", "now", "ain", "aren", "couldn", "didn", "doesn", "hadn", "hasn",
    "haven", "isn", "ma", "mightn", "mustn", "needn", "shan", "shouldn", "wasn", "weren",
    "won", "wouldn", "ll", "re", "ve",
];

/// Lowercases, keeps letters only, drops stop words and one-letter tokens
#[derive(Debug, Clone)]
pub struct TextCleaner {
    non_letters: Regex,
    stop_words: HashSet<&'static str>,
}

impl TextCleaner {
    pub fn new() -> Result<Self> {
        let non_letters = Regex::new(r"[^a-z\s]")
            .map_err(|e| DepFusionError::ComputationError(format!("cleaner pattern: {}", e)))?;
        Ok(Self {
            non_letters,
            stop_words: ENGLISH_STOP_WORDS.iter().copied().collect(),
        })
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let letters = self.non_letters.replace_all(&lower, "");
        letters
            .split_whitespace()
            .filter(|t| t.len() > 1 && !self.stop_words.contains(*t))
            .map(|t| t.to_string())
            .collect()
    }

    pub fn clean(&self, text: &str) -> String {
        self.tokenize(text).join(" ")
    }
}

/// Surface statistics and sentiment of one participant's transcript
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFeatures {
    pub sentiment: SentimentScores,
    pub word_count: usize,
    pub unique_words: usize,
    pub lexical_div: f64,
    pub avg_word_len: f64,
    pub avg_conf: f64,
}

impl TextFeatures {
    /// Features of `text` with the given mean transcription confidence
    pub fn compute(analyzer: &SentimentAnalyzer, text: &str, avg_conf: f64) -> Self {
        let words: Vec<&str> = text.split_whitespace().collect();
        let word_count = words.len();
        let unique_words = words.iter().map(|w| w.to_lowercase()).collect::<HashSet<_>>().len();
        let (lexical_div, avg_word_len) = if word_count == 0 {
            (0.0, 0.0)
        } else {
            let distinct_exact = words.iter().collect::<HashSet<_>>().len();
            let total_chars: usize = words.iter().map(|w| w.chars().count()).sum();
            (
                distinct_exact as f64 / word_count as f64,
                total_chars as f64 / word_count as f64,
            )
        };
        Self {
            sentiment: analyzer.polarity_scores(text),
            word_count,
            unique_words,
            lexical_div,
            avg_word_len,
            avg_conf,
        }
    }

    /// Values in [`BASE_FEATURE_NAMES`] order
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.sentiment.neg,
            self.sentiment.neu,
            self.sentiment.pos,
            self.sentiment.compound,
            self.word_count as f64,
            self.unique_words as f64,
            self.lexical_div,
            self.avg_word_len,
            self.avg_conf,
        ]
    }
}

/// TF-IDF over cleaned documents
///
/// The vocabulary keeps the `max_features` most frequent terms whose
/// document frequency lies in `[min_df, max_df * n_docs]`; columns are in
/// alphabetical term order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    max_features: usize,
    min_df: usize,
    max_df: f64,
    vocabulary: BTreeMap<String, usize>,
    idf: Option<Array1<f64>>,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self {
            max_features: 50,
            min_df: 2,
            max_df: 0.95,
            vocabulary: BTreeMap::new(),
            idf: None,
        }
    }
}

impl TfidfVectorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = n;
        self
    }

    pub fn with_min_df(mut self, min_df: usize) -> Self {
        self.min_df = min_df;
        self
    }

    pub fn with_max_df(mut self, max_df: f64) -> Self {
        self.max_df = max_df;
        self
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.vocabulary.keys().cloned().collect()
    }

    pub fn fit(&mut self, documents: &[String]) -> Result<&mut Self> {
        let n_docs = documents.len();
        let max_doc_count = self.max_df * n_docs as f64;

        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        let mut term_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in documents {
            let mut seen = BTreeSet::new();
            for term in doc.split_whitespace() {
                *term_freq.entry(term).or_insert(0) += 1;
                if seen.insert(term) {
                    *doc_freq.entry(term).or_insert(0) += 1;
                }
            }
        }

        let mut kept: Vec<(&str, usize)> = doc_freq
            .iter()
            .filter(|&(_, &df)| df >= self.min_df && (df as f64) <= max_doc_count)
            .map(|(&term, _)| (term, term_freq[term]))
            .collect();
        // Most frequent first; alphabetical among equals
        kept.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        kept.truncate(self.max_features);

        let mut terms: Vec<&str> = kept.into_iter().map(|(t, _)| t).collect();
        terms.sort_unstable();
        self.vocabulary = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i))
            .collect();

        // Smoothed idf: ln((1 + n) / (1 + df)) + 1
        let idf: Array1<f64> = terms
            .iter()
            .map(|t| ((1.0 + n_docs as f64) / (1.0 + doc_freq[t] as f64)).ln() + 1.0)
            .collect();
        self.idf = Some(idf);
        Ok(self)
    }

    /// L2-normalised tf-idf rows
    pub fn transform(&self, documents: &[String]) -> Result<Array2<f64>> {
        let idf = self.idf.as_ref().ok_or(DepFusionError::ModelNotFitted)?;
        let mut out = Array2::zeros((documents.len(), self.vocabulary.len()));
        for (i, doc) in documents.iter().enumerate() {
            for term in doc.split_whitespace() {
                if let Some(&j) = self.vocabulary.get(term) {
                    out[[i, j]] += 1.0;
                }
            }
            let mut row = out.row_mut(i);
            row *= idf;
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|v| v / norm);
            }
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, documents: &[String]) -> Result<Array2<f64>> {
        self.fit(documents)?;
        self.transform(documents)
    }
}

/// Joined utterances and mean confidence of one transcript
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptText {
    pub text: String,
    pub avg_conf: f64,
}

impl TranscriptText {
    /// Keep utterances longer than two words and join them
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let text_col = df
            .column("Text")
            .map_err(|_| DepFusionError::FeatureNotFound("Text".to_string()))?
            .cast(&DataType::String)?;
        let utterances: Vec<Option<String>> = text_col
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|s| s.map(|s| s.to_string()))
            .collect();
        let confidences = if df.column("Confidence").is_ok() {
            Some(column_f64(df, "Confidence")?)
        } else {
            None
        };

        let mut kept = Vec::new();
        let mut conf_sum = 0.0;
        for (row, utterance) in utterances.into_iter().enumerate() {
            let Some(utterance) = utterance else { continue };
            if utterance.split_whitespace().count() <= 2 {
                continue;
            }
            if let Some(conf) = &confidences {
                conf_sum += conf[row];
            }
            kept.push(utterance);
        }

        let avg_conf = if confidences.is_some() && !kept.is_empty() {
            conf_sum / kept.len() as f64
        } else {
            0.0
        };
        let joined = kept.join(" ");
        let text = if joined.trim().chars().count() < MIN_TEXT_CHARS {
            PLACEHOLDER_TEXT.to_string()
        } else {
            joined
        };
        Ok(Self { text, avg_conf })
    }
}

/// Builds the text feature table for a set of participants
#[derive(Debug, Clone)]
pub struct TextExtractor {
    analyzer: SentimentAnalyzer,
    cleaner: TextCleaner,
    vectorizer: TfidfVectorizer,
}

impl TextExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            analyzer: SentimentAnalyzer::new(),
            cleaner: TextCleaner::new()?,
            vectorizer: TfidfVectorizer::new(),
        })
    }

    pub fn with_vectorizer(mut self, vectorizer: TfidfVectorizer) -> Self {
        self.vectorizer = vectorizer;
        self
    }

    /// One record per participant with a transcript; missing ones are skipped
    pub fn extract(&mut self, source: &dyn DataSource, pids: &[i64]) -> Result<Vec<FeatureRecord>> {
        let mut records = Vec::new();
        let mut documents = Vec::new();
        let mut missing = Vec::new();

        for &pid in pids {
            let Some(df) = source.transcript(pid)? else {
                missing.push(pid);
                continue;
            };
            let transcript = match TranscriptText::from_frame(&df) {
                Ok(t) => t,
                Err(e) => {
                    warn!(pid, error = %e, "Unreadable transcript, skipping");
                    continue;
                }
            };
            let features = TextFeatures::compute(&self.analyzer, &transcript.text, transcript.avg_conf);
            let values = BASE_FEATURE_NAMES
                .iter()
                .map(|n| n.to_string())
                .zip(features.to_vec())
                .collect();
            records.push(FeatureRecord { pid, values });
            documents.push(self.cleaner.clean(&transcript.text));
        }
        if !missing.is_empty() {
            warn!(count = missing.len(), pids = ?missing, "Missing transcripts");
        }

        if documents.is_empty() {
            return Ok(records);
        }
        let tfidf = self.vectorizer.fit_transform(&documents)?;
        if tfidf.ncols() == 0 {
            warn!("No term met the document-frequency bounds, emitting no tfidf columns");
        }
        for (record, row) in records.iter_mut().zip(tfidf.rows()) {
            for (j, v) in row.iter().enumerate() {
                record.values.push((format!("tfidf_{}", j), *v));
            }
        }
        info!(
            participants = records.len(),
            terms = self.vectorizer.vocabulary_len(),
            "Extracted text features"
        );
        Ok(records)
    }
}
