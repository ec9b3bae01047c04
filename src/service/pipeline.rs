//! 流水线编排：收敛表范围 -> 子问题 -> 选列 -> 过滤 -> 码值匹配 -> SQL 循环 -> 展示建议 -> 可视化循环。
//!
//! 各阶段严格顺序执行。除空问题与安全违规外，任何阶段失败都降级为默认值继续向下。

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::core::sandbox::Sandbox;
use crate::error::PipelineError;
use crate::infra::config::PipelineSettings;
use crate::infra::oracle::GenerativeOracle;
use crate::infra::store::RelationalStore;
use crate::models::context::PipelineReport;
use crate::models::knowledge::KnowledgeBase;
use crate::models::visual::VisualOutput;
use crate::service::advisor::advise;
use crate::service::filters::FilterExtractor;
use crate::service::narrower::SchemaNarrower;
use crate::service::query_loop::QueryLoop;
use crate::service::value_matcher::ValueMatcher;
use crate::service::viz_loop::VizLoop;

pub struct Pipeline {
    oracle: Arc<dyn GenerativeOracle>,
    store: Arc<dyn RelationalStore>,
    kb: Arc<KnowledgeBase>,
    settings: PipelineSettings,
    sandbox: Sandbox,
}

impl Pipeline {
    pub fn new(
        oracle: Arc<dyn GenerativeOracle>,
        store: Arc<dyn RelationalStore>,
        kb: Arc<KnowledgeBase>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            oracle,
            store,
            kb,
            settings,
            sandbox: Sandbox::default(),
        }
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// `max_retries` 为空时使用配置中的默认值
    pub async fn run(&self, question: &str, max_retries: Option<u32>) -> Result<PipelineReport, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }
        let max_retries = max_retries.unwrap_or(self.settings.max_retries);
        self.run_with_id(Uuid::new_v4(), question, max_retries).await
    }

    #[instrument(name = "pipeline", skip(self, run_id, question), fields(run_id = %run_id))]
    async fn run_with_id(&self, run_id: Uuid, question: &str, max_retries: u32) -> Result<PipelineReport, PipelineError> {
        info!("开始处理问题: {}", question);
        let oracle = self.oracle.as_ref();
        let store = self.store.as_ref();

        let narrower = SchemaNarrower::new(oracle, &self.kb, &self.settings);
        let mut tables = narrower.narrow(question).await;
        if tables.is_empty() {
            warn!("表范围为空，使用默认分组");
            tables = self.settings.default_tables();
        }
        let subquestions = narrower.decompose(question, &tables).await;
        let columns_selected = narrower.select_columns(question, &subquestions).await;

        let (filters_raw, filters) = FilterExtractor::new(oracle).extract(question, &columns_selected).await;
        let filters_matched = ValueMatcher::new(store).resolve(&filters).await;

        let query = QueryLoop::new(oracle, store, self.settings.row_limit)
            .run(question, &columns_selected, &filters_matched, max_retries)
            .await?;
        info!("SQL 阶段 {:?}，重试 {} 次，返回 {} 行", query.status, query.retries, query.result.len());

        let visualization_request = advise(oracle, question, &query.sql, &query.result).await;

        let viz = VizLoop::new(oracle, &self.sandbox)
            .run(&visualization_request, &query.result, max_retries)
            .await?;
        info!(
            "可视化阶段 {:?}，输出 {}，重试 {} 次",
            viz.status,
            viz.artifact.output.as_ref().map_or("none", VisualOutput::arm),
            viz.artifact.retries
        );

        Ok(PipelineReport {
            run_id,
            question: question.to_string(),
            tables,
            subquestions,
            columns_selected,
            filters_raw,
            filters_matched,
            sql: query.sql,
            status: query.status,
            error: query.error,
            sql_retries: query.retries,
            result: query.result,
            visualization_request,
            visualization_code: viz.artifact.code.clone(),
            visualization_status: viz.status,
            visualization_error: viz.artifact.last_error.clone(),
            artifact: viz.artifact,
        })
    }
}
