use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ax_state::AppState;
use crate::error::PipelineError;
use crate::models::context::ChatRequest;

/// 问答入口：问题 -> 流水线报告
/// 空问题 400，安全违规 422，其余（包括重试耗尽）一律 200 并在报告里标明状态
pub async fn chat_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> impl IntoResponse {
    info!("收到问答请求: {}", payload.question);

    match state.pipeline.run(&payload.question, payload.max_retries).await {
        Ok(report) => Json(report).into_response(),
        Err(e @ PipelineError::EmptyQuestion) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(PipelineError::SafetyViolation { statement, reason }) => {
            warn!("拒绝执行非只读语句: {}", statement);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": "safety violation",
                    "reason": reason,
                    "statement": statement,
                })),
            )
                .into_response()
        }
    }
}
