use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::repair_loop::LoopStatus;
use crate::models::filter::FilterPredicate;
use crate::models::result::ResultSet;
use crate::models::schema::{ColumnSelection, Subquestion};
use crate::models::visual::VisualizationArtifact;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String, // 用户提问内容
    pub max_retries: Option<u32>,
}

/// 一次完整流水线运行的结果，返回给展示层
#[derive(Debug, Serialize, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub question: String,
    pub tables: Vec<String>,
    pub subquestions: Vec<Subquestion>,
    pub columns_selected: Vec<ColumnSelection>,
    /// 模型返回的原始过滤条件文本
    pub filters_raw: String,
    pub filters_matched: FilterPredicate,
    pub sql: String,
    pub status: LoopStatus,
    pub error: String,
    pub sql_retries: u32,
    pub result: ResultSet,
    pub visualization_request: String,
    pub visualization_code: String,
    pub artifact: VisualizationArtifact,
    pub visualization_status: LoopStatus,
    pub visualization_error: String,
}
