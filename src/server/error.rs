//! Error types for the server

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::DepFusionError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid JSON body: {0}")]
    Json(#[from] JsonRejection),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(#[from] DepFusionError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) | ServerError::Json(_) => StatusCode::BAD_REQUEST,
            ServerError::ModelUnavailable(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::BadRequest(msg) => msg.clone(),
            ServerError::Json(rejection) => rejection.body_text(),
            ServerError::ModelUnavailable(msg) => {
                tracing::error!(detail = %msg, "Model unavailable");
                msg.clone()
            }
            ServerError::Internal(e) => {
                tracing::error!(detail = %e, "Internal server error");
                "An internal error occurred".to_string()
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
