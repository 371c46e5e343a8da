//! HTTP request handlers

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::extract::SentimentScores;
use crate::fusion::RiskTier;

use super::combined::{combine, round4, DECISION_THRESHOLD, NEUTRAL_PROBABILITY};
use super::error::{Result, ServerError};
use super::questionnaire::{QuestionnaireScore, Severity, MAX_SCORE};
use super::state::ServiceContext;
use super::text::{is_scorable, serve_features};

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub text_model_loaded: bool,
    pub uptime_secs: i64,
}

pub async fn health_check(State(ctx): State<Arc<ServiceContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        text_model_loaded: ctx.text_model().is_some(),
        uptime_secs: chrono::Utc::now()
            .signed_duration_since(ctx.started_at())
            .num_seconds(),
    })
}

// ============================================================================
// Questionnaire
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct QuestionnaireRequest {
    #[serde(default)]
    pub answers: Vec<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponse {
    pub score: i64,
    pub max_score: i64,
    pub severity: Severity,
    pub depressed: bool,
}

pub async fn questionnaire_score(
    payload: std::result::Result<Json<QuestionnaireRequest>, JsonRejection>,
) -> Result<Json<QuestionnaireResponse>> {
    let Json(req) = payload?;
    let scored = QuestionnaireScore::from_answers(&req.answers)?;
    debug!(score = scored.score, severity = scored.severity.as_str(), "Scored questionnaire");
    Ok(Json(QuestionnaireResponse {
        score: scored.score,
        max_score: MAX_SCORE,
        severity: scored.severity,
        depressed: scored.depressed,
    }))
}

// ============================================================================
// Text analysis
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AnalyzeTextRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeTextResponse {
    pub probability: f64,
    pub prediction: u8,
    pub sentiment: SentimentScores,
    pub word_count: usize,
    pub unique_words: usize,
}

fn model_unavailable() -> ServerError {
    ServerError::ModelUnavailable("Text model not loaded".to_string())
}

pub async fn analyze_text(
    State(ctx): State<Arc<ServiceContext>>,
    payload: std::result::Result<Json<AnalyzeTextRequest>, JsonRejection>,
) -> Result<Json<AnalyzeTextResponse>> {
    let Json(req) = payload?;
    if !is_scorable(&req.text) {
        return Err(ServerError::BadRequest("Need more text for analysis".to_string()));
    }

    let features = serve_features(ctx.analyzer(), &req.text);
    let probability = ctx
        .text_probability(&features)?
        .ok_or_else(model_unavailable)?;
    info!(
        words = features.word_count,
        probability = probability,
        "Analyzed text"
    );

    Ok(Json(AnalyzeTextResponse {
        probability: round4(probability),
        prediction: u8::from(probability >= DECISION_THRESHOLD),
        sentiment: features.sentiment,
        word_count: features.word_count,
        unique_words: features.unique_words,
    }))
}

// ============================================================================
// Combined prediction
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualData {
    #[serde(default)]
    pub samples_collected: u64,
    pub visual_prob: Option<f64>,
    pub flat_affect: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedRequest {
    #[serde(default)]
    pub phq_answers: Vec<i64>,
    #[serde(default)]
    pub interview_text: String,
    pub visual_data: Option<VisualData>,
}

#[derive(Debug, Serialize)]
pub struct PhqSummary {
    pub score: i64,
    pub severity: Severity,
    pub depressed: bool,
}

#[derive(Debug, Serialize)]
pub struct ProbabilitySummary {
    pub probability: f64,
    pub prediction: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualSummary {
    pub probability: f64,
    pub flat_affect: f64,
    pub samples: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedSummary {
    pub probability: f64,
    pub risk_level: RiskTier,
    pub prediction: u8,
}

#[derive(Debug, Serialize)]
pub struct CombinedResponse {
    pub phq: PhqSummary,
    pub text: ProbabilitySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual: Option<VisualSummary>,
    pub combined: CombinedSummary,
}

fn unit_interval(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ServerError::BadRequest(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )))
    }
}

pub async fn combined_predict(
    State(ctx): State<Arc<ServiceContext>>,
    payload: std::result::Result<Json<CombinedRequest>, JsonRejection>,
) -> Result<Json<CombinedResponse>> {
    let Json(req) = payload?;
    let phq = QuestionnaireScore::from_partial(&req.phq_answers)?;

    let text_probability = if is_scorable(&req.interview_text) {
        let features = serve_features(ctx.analyzer(), &req.interview_text);
        ctx.text_probability(&features)?
            .ok_or_else(model_unavailable)?
    } else {
        NEUTRAL_PROBABILITY
    };

    let visual = match &req.visual_data {
        Some(v) if v.samples_collected > 0 => Some(VisualSummary {
            probability: unit_interval("visualProb", v.visual_prob.unwrap_or(NEUTRAL_PROBABILITY))?,
            flat_affect: v.flat_affect.unwrap_or(0.0),
            samples: v.samples_collected,
        }),
        _ => None,
    };

    let fused = combine(
        phq.normalized(),
        text_probability,
        visual.as_ref().map(|v| v.probability),
    );
    info!(
        phq = phq.score,
        text = text_probability,
        visual = ?visual.as_ref().map(|v| v.probability),
        combined = fused.probability,
        risk = fused.risk_tier.as_str(),
        "Combined prediction"
    );

    Ok(Json(CombinedResponse {
        phq: PhqSummary {
            score: phq.score,
            severity: phq.severity,
            depressed: phq.depressed,
        },
        text: ProbabilitySummary {
            probability: round4(text_probability),
            prediction: u8::from(text_probability >= DECISION_THRESHOLD),
        },
        visual: visual.map(|v| VisualSummary {
            probability: round4(v.probability),
            flat_affect: round4(v.flat_affect),
            samples: v.samples,
        }),
        combined: CombinedSummary {
            probability: round4(fused.probability),
            risk_level: fused.risk_tier,
            prediction: u8::from(fused.prediction),
        },
    }))
}
