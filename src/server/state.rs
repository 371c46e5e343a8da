//! Immutable service context shared by all handlers

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::Result;
use crate::extract::{SentimentAnalyzer, TextFeatures};
use crate::training::ModalityModel;

use super::text::serve_vector;
use super::ServerConfig;

/// Name of the persisted model the text endpoints score with
pub const TEXT_MODEL_NAME: &str = "text";

/// Everything a request needs, built once at startup
pub struct ServiceContext {
    pub config: ServerConfig,
    text_model: Option<ModalityModel>,
    analyzer: SentimentAnalyzer,
    started_at: DateTime<Utc>,
}

impl ServiceContext {
    pub fn new(config: ServerConfig, text_model: Option<ModalityModel>) -> Self {
        Self {
            config,
            text_model,
            analyzer: SentimentAnalyzer::new(),
            started_at: Utc::now(),
        }
    }

    /// Load the text model pair from `config.models_dir`
    ///
    /// A missing artifact leaves the context without a text model; a present
    /// but unreadable one is an error.
    pub fn load(config: ServerConfig) -> Result<Self> {
        let model_path = ModalityModel::model_path(&config.models_dir, TEXT_MODEL_NAME);
        let text_model = if model_path.exists() {
            let model = ModalityModel::load(&config.models_dir, TEXT_MODEL_NAME)?;
            info!(
                path = %model_path.display(),
                n_features = ?model.n_features(),
                threshold = model.threshold,
                "Loaded text model"
            );
            Some(model)
        } else {
            warn!(path = %model_path.display(), "Text model not found, text scoring disabled");
            None
        };
        Ok(Self::new(config, text_model))
    }

    pub fn analyzer(&self) -> &SentimentAnalyzer {
        &self.analyzer
    }

    pub fn text_model(&self) -> Option<&ModalityModel> {
        self.text_model.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Text model probability for serve-time features, `None` without a model
    pub fn text_probability(&self, features: &TextFeatures) -> Result<Option<f64>> {
        let Some(model) = &self.text_model else {
            return Ok(None);
        };
        let width = model.n_features().unwrap_or(0);
        let proba = model.predict_proba(&serve_vector(features, width)?)?;
        Ok(proba.first().copied())
    }
}
