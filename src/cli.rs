use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "nl2viz", version, about = "自然语言问题 -> 只读 SQL -> 可视化")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 启动 HTTP 服务（默认）
    Serve,
    /// 运行一次流水线并打印 JSON 报告
    Ask {
        question: String,
        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// 离线构建知识库
    BuildKb {
        /// 输出路径，缺省为 KNOWLEDGEBASE_PATH
        #[arg(long)]
        out: Option<PathBuf>,
    },
}
