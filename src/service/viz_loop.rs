//! 可视化代码生成-沙箱执行-修复循环。

use anyhow::bail;
use async_trait::async_trait;
use tracing::instrument;

use crate::core::parsing::extract_code_block;
use crate::core::prompts;
use crate::core::repair_loop::{run_repair_loop, LoopStatus, RepairStrategy};
use crate::core::sandbox::Sandbox;
use crate::error::PipelineError;
use crate::infra::oracle::GenerativeOracle;
use crate::models::result::ResultSet;
use crate::models::visual::{VisualOutput, VisualizationArtifact};

const SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone)]
pub struct VizOutcome {
    pub artifact: VisualizationArtifact,
    pub status: LoopStatus,
}

struct VizStrategy<'a> {
    oracle: &'a dyn GenerativeOracle,
    sandbox: &'a Sandbox,
    request: &'a str,
    result: &'a ResultSet,
}

impl<'a> VizStrategy<'a> {
    fn data_context(&self) -> String {
        format!(
            "Data structure & types:\n{}\n\nSample data:\n{}",
            self.result.structure(),
            self.result.sample(SAMPLE_ROWS)
        )
    }

    async fn ask_code(&self, system: &str, payload: &str) -> anyhow::Result<String> {
        let code = extract_code_block(&self.oracle.complete(system, payload).await?, "lua");
        if code.is_empty() {
            bail!("oracle returned no code");
        }
        Ok(code)
    }
}

#[async_trait]
impl<'a> RepairStrategy for VizStrategy<'a> {
    type Candidate = String;
    type Output = VisualOutput;

    fn name(&self) -> &'static str {
        "visualization"
    }

    fn error_budget(&self) -> usize {
        800
    }

    async fn generate(&self) -> anyhow::Result<String> {
        let payload = format!("Visualization request:\n{}\n\n{}", self.request, self.data_context());
        self.ask_code(prompts::VIZ_GENERATOR, &payload).await
    }

    async fn execute(&self, code: &String) -> anyhow::Result<VisualOutput> {
        Ok(self.sandbox.run(code, self.result)?)
    }

    async fn repair(&self, previous: &String, error: &str) -> anyhow::Result<String> {
        let payload = format!(
            "Lua code:\n```lua\n{}\n```\n\nError:\n{}\n\n{}",
            previous,
            error,
            self.data_context()
        );
        self.ask_code(prompts::VIZ_FIXER, &payload).await
    }
}

pub struct VizLoop<'a> {
    oracle: &'a dyn GenerativeOracle,
    sandbox: &'a Sandbox,
}

impl<'a> VizLoop<'a> {
    pub fn new(oracle: &'a dyn GenerativeOracle, sandbox: &'a Sandbox) -> Self {
        Self { oracle, sandbox }
    }

    #[instrument(skip(self, request, result), fields(rows = result.len()))]
    pub async fn run(&self, request: &str, result: &ResultSet, max_retries: u32) -> Result<VizOutcome, PipelineError> {
        let strategy = VizStrategy {
            oracle: self.oracle,
            sandbox: self.sandbox,
            request,
            result,
        };
        let outcome = run_repair_loop(&strategy, max_retries).await?;
        Ok(VizOutcome {
            artifact: VisualizationArtifact {
                output: outcome.output,
                code: outcome.candidate.unwrap_or_default(),
                retries: outcome.retries,
                last_error: outcome.last_error,
            },
            status: outcome.status,
        })
    }
}
