use axum::{extract::State, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::ax_state::AppState;

/// 列出知识库中的表
pub async fn list_tables(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tables: Vec<Value> = state
        .pipeline
        .knowledge_base()
        .iter()
        .map(|(table, k)| {
            json!({
                "table": table,
                "description": k.description(),
                "column_count": k.columns().len(),
            })
        })
        .collect();
    Json(tables)
}

pub async fn health() -> &'static str {
    "ok"
}
