//! KPI extraction handler.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::super::AppState;
use crate::pipeline::{InvocationRequest, Mode};

/// Query params for `/api/upseller`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractParams {
    pub d: Option<String>,
    pub m: Option<String>,
    pub y: Option<String>,
    pub mode: Option<String>,
    pub top: Option<String>,
}

impl ExtractParams {
    fn into_request(self) -> InvocationRequest {
        InvocationRequest {
            mode: Mode::from_param(self.mode.as_deref()),
            // Unparseable values fall back to the configured size.
            top: self.top.as_deref().and_then(|t| t.trim().parse().ok()),
            day: self.d,
            month: self.m,
            year: self.y,
        }
    }
}

/// Run one invocation. Always 200; the body carries `ok`.
pub async fn extract_kpis(
    State(state): State<AppState>,
    Query(params): Query<ExtractParams>,
) -> Json<Value> {
    let envelope = state.extractor.handle(params.into_request()).await;
    Json(envelope.to_json())
}
