//! SQL 生成-校验-执行-修复循环。

use anyhow::bail;
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::core::parsing::extract_sql;
use crate::core::prompts;
use crate::core::repair_loop::{run_repair_loop, LoopStatus, RepairStrategy};
use crate::core::sql_guard::{ensure_read_only, wrap_with_limit};
use crate::error::PipelineError;
use crate::infra::oracle::GenerativeOracle;
use crate::infra::store::RelationalStore;
use crate::models::filter::FilterPredicate;
use crate::models::result::ResultSet;
use crate::models::schema::{columns_to_prompt, ColumnSelection};

/// 载荷中的段落标题，SQL_GENERATOR / SQL_FIXER 按这些名字引用
const COLUMNS_HEADER: &str = "Selected columns";
const FILTERS_HEADER: &str = "Filters";
const FAILING_SQL_HEADER: &str = "Failing SQL";
const DB_ERROR_HEADER: &str = "Database error";

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// 模型给出的原始语句（未包装 LIMIT）
    pub sql: String,
    pub status: LoopStatus,
    pub error: String,
    pub retries: u32,
    /// 未通过时为空结果集
    pub result: ResultSet,
}

struct QueryStrategy<'a> {
    oracle: &'a dyn GenerativeOracle,
    store: &'a dyn RelationalStore,
    question: &'a str,
    columns: String,
    filters: String,
    row_limit: u64,
}

impl<'a> QueryStrategy<'a> {
    fn context(&self) -> String {
        format!(
            "User question:\n{}\n\n{}:\n{}\n\n{}:\n{}",
            self.question, COLUMNS_HEADER, self.columns, FILTERS_HEADER, self.filters
        )
    }

    async fn ask_sql(&self, system: &str, payload: &str) -> anyhow::Result<String> {
        let sql = extract_sql(&self.oracle.complete(system, payload).await?);
        if sql.trim().is_empty() {
            bail!("oracle returned no statement");
        }
        Ok(sql)
    }
}

#[async_trait]
impl<'a> RepairStrategy for QueryStrategy<'a> {
    type Candidate = String;
    type Output = ResultSet;

    fn name(&self) -> &'static str {
        "sql"
    }

    async fn generate(&self) -> anyhow::Result<String> {
        self.ask_sql(prompts::SQL_GENERATOR, &self.context()).await
    }

    fn validate(&self, sql: &String) -> Result<(), PipelineError> {
        ensure_read_only(sql).map_err(|v| PipelineError::SafetyViolation {
            statement: sql.clone(),
            reason: v.to_string(),
        })
    }

    async fn execute(&self, sql: &String) -> anyhow::Result<ResultSet> {
        let bounded = wrap_with_limit(sql, self.row_limit);
        if let Err(e) = self.store.explain(&bounded).await {
            debug!("EXPLAIN 预检失败（忽略）: {:#}", e);
        }
        self.store.execute(&bounded).await
    }

    async fn repair(&self, previous: &String, error: &str) -> anyhow::Result<String> {
        let payload = format!(
            "{}\n\n{}:\n{}\n\n{}:\n{}",
            self.context(),
            FAILING_SQL_HEADER,
            previous,
            DB_ERROR_HEADER,
            error
        );
        self.ask_sql(prompts::SQL_FIXER, &payload).await
    }
}

pub struct QueryLoop<'a> {
    oracle: &'a dyn GenerativeOracle,
    store: &'a dyn RelationalStore,
    row_limit: u64,
}

impl<'a> QueryLoop<'a> {
    pub fn new(oracle: &'a dyn GenerativeOracle, store: &'a dyn RelationalStore, row_limit: u64) -> Self {
        Self { oracle, store, row_limit }
    }

    /// 安全违规直接返回 Err，其余失败体现在 `QueryOutcome::status`
    #[instrument(skip(self, columns, filters))]
    pub async fn run(
        &self,
        question: &str,
        columns: &[ColumnSelection],
        filters: &FilterPredicate,
        max_retries: u32,
    ) -> Result<QueryOutcome, PipelineError> {
        let strategy = QueryStrategy {
            oracle: self.oracle,
            store: self.store,
            question,
            columns: columns_to_prompt(columns),
            filters: filters.to_prompt(),
            row_limit: self.row_limit,
        };
        let outcome = run_repair_loop(&strategy, max_retries).await?;
        Ok(QueryOutcome {
            sql: outcome.candidate.unwrap_or_default(),
            status: outcome.status,
            error: outcome.last_error,
            retries: outcome.retries,
            result: outcome.output.unwrap_or_default(),
        })
    }
}
