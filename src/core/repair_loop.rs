//! 有界的 生成 -> 校验 -> 执行 -> 修复 状态机。
//!
//! SQL 修复循环与可视化修复循环共用这一套逻辑，差异全部放在 [`RepairStrategy`] 里。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::parsing::truncate_chars;
use crate::error::PipelineError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Pass,
    Exhausted,
}

/// 状态机当前所处的阶段，仅用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Generate,
    Validate,
    Execute,
    Repair,
    Pass,
    Exhausted,
}

#[async_trait]
pub trait RepairStrategy: Send + Sync {
    type Candidate: Clone + Send + Sync;
    type Output: Send;

    /// 日志中的循环名称
    fn name(&self) -> &'static str;

    /// 修复提示中错误摘要的最大字符数
    fn error_budget(&self) -> usize {
        600
    }

    /// 首次生成，只进入一次
    async fn generate(&self) -> anyhow::Result<Self::Candidate>;

    /// 执行前的硬性闸门：失败直接终止整个循环，不消耗重试次数
    fn validate(&self, _candidate: &Self::Candidate) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn execute(&self, candidate: &Self::Candidate) -> anyhow::Result<Self::Output>;

    /// 基于上一次候选和错误摘要重新生成
    async fn repair(&self, previous: &Self::Candidate, error: &str) -> anyhow::Result<Self::Candidate>;
}

#[derive(Debug)]
pub struct LoopOutcome<C, O> {
    /// 最后一次成功生成的候选；所有生成都失败时为 None
    pub candidate: Option<C>,
    pub output: Option<O>,
    pub status: LoopStatus,
    /// 失败次数，k 次失败后等于 k
    pub retries: u32,
    pub last_error: String,
}

/// 运行修复循环。最多 `max_retries + 1` 次生成（1 次 Generate + 至多 max_retries 次 Repair），
/// 每次生成至多执行一次。
pub async fn run_repair_loop<S: RepairStrategy>(
    strategy: &S,
    max_retries: u32,
) -> Result<LoopOutcome<S::Candidate, S::Output>, PipelineError> {
    let mut candidate: Option<S::Candidate> = None;
    let mut retries: u32 = 0;
    let mut last_error = String::new();

    while retries <= max_retries {
        let state = if candidate.is_none() { LoopState::Generate } else { LoopState::Repair };
        debug!(target: "repair_loop", "{} 进入 {:?}，已失败 {} 次", strategy.name(), state, retries);

        let next = match &candidate {
            None => strategy.generate().await,
            Some(prev) => strategy.repair(prev, &last_error).await,
        };

        let current = match next {
            Ok(c) => c,
            Err(e) => {
                retries += 1;
                last_error = summarize(&e, strategy.error_budget());
                warn!("{} 生成失败 (第 {} 次): {}", strategy.name(), retries, last_error);
                continue;
            }
        };

        debug!(target: "repair_loop", "{} 进入 {:?}", strategy.name(), LoopState::Validate);
        strategy.validate(&current)?;

        debug!(target: "repair_loop", "{} 进入 {:?}", strategy.name(), LoopState::Execute);
        let executed = strategy.execute(&current).await;
        candidate = Some(current);

        match executed {
            Ok(output) => {
                info!("{} 进入 {:?}，失败次数 {}", strategy.name(), LoopState::Pass, retries);
                return Ok(LoopOutcome {
                    candidate,
                    output: Some(output),
                    status: LoopStatus::Pass,
                    retries,
                    last_error: String::new(),
                });
            }
            Err(e) => {
                retries += 1;
                last_error = summarize(&e, strategy.error_budget());
                warn!("{} 执行失败 (第 {} 次): {}", strategy.name(), retries, last_error);
            }
        }
    }

    warn!(
        "{} 进入 {:?}，共失败 {} 次",
        strategy.name(),
        LoopState::Exhausted,
        retries
    );
    Ok(LoopOutcome {
        candidate,
        output: None,
        status: LoopStatus::Exhausted,
        retries,
        last_error,
    })
}

/// 错误摘要：错误信息 + 原因链，按字符截断
pub fn summarize(err: &anyhow::Error, budget: usize) -> String {
    truncate_chars(&format!("{:#}", err), budget)
}
