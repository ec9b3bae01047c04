use tracing::instrument;

use crate::core::prompts;
use crate::infra::oracle::GenerativeOracle;
use crate::models::result::ResultSet;
use crate::service::ask;

/// 给模型看的样例行数
const SAMPLE_ROWS: usize = 5;

pub const FALLBACK_ADVICE: &str =
    "Show the result as a table. If the result is empty, show a short message saying there is no data.";

/// 根据问题、SQL 与结果形状给出展示建议（自由文本）
#[instrument(skip(oracle, sql, result), fields(rows = result.len()))]
pub async fn advise(oracle: &dyn GenerativeOracle, question: &str, sql: &str, result: &ResultSet) -> String {
    let payload = format!(
        "User question:\n{}\n\nSQL query:\n{}\n\nData structure & types:\n{}\n\nSample data:\n{}",
        question,
        sql,
        result.structure(),
        result.sample(SAMPLE_ROWS)
    );
    ask(oracle, "advise", prompts::BI_EXPERT, &payload)
        .await
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_ADVICE.to_string())
}
