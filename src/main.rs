mod api;
mod cli;
mod core;
mod error;
mod infra;
mod models;
mod service;

use axum::{routing::{get, post}, Router};
use clap::Parser;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::chat::chat_query;
use crate::api::knowledge::{health, list_tables};
use crate::cli::{Cli, Command};
use crate::infra::config::Settings;
use crate::infra::oracle::{ChatCompletionsOracle, GenerativeOracle};
use crate::infra::store::{RelationalStore, SqlStore};
use crate::models::knowledge::KnowledgeBase;
use crate::service::kb_builder::{base_table_descriptions, KnowledgeBaseBuilder};
use crate::service::pipeline::Pipeline;

pub mod ax_state {
    use crate::service::pipeline::Pipeline;

    pub struct AppState {
        pub pipeline: Pipeline,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    let store: Arc<dyn RelationalStore> = Arc::new(SqlStore::connect(&settings.database_url).await?);
    let oracle: Arc<dyn GenerativeOracle> = Arc::new(ChatCompletionsOracle::new(settings.oracle.clone())?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, oracle, store).await,
        Command::Ask { question, max_retries } => {
            let pipeline = load_pipeline(&settings, oracle, store)?;
            let report = pipeline.run(&question, max_retries).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::BuildKb { out } => {
            let mut tables: Vec<String> = Vec::new();
            for t in settings.pipeline.table_groups.values().flatten() {
                if !tables.contains(t) {
                    tables.push(t.clone());
                }
            }
            let kb = KnowledgeBaseBuilder::new(oracle.as_ref(), store.as_ref())
                .build(&tables, &base_table_descriptions())
                .await?;
            let out = out.unwrap_or(settings.knowledgebase_path);
            kb.save(&out)?;
            info!("知识库已写入 {}，共 {} 张表", out.display(), kb.len());
            Ok(())
        }
    }
}

fn load_pipeline(
    settings: &Settings,
    oracle: Arc<dyn GenerativeOracle>,
    store: Arc<dyn RelationalStore>,
) -> anyhow::Result<Pipeline> {
    let kb = KnowledgeBase::load(&settings.knowledgebase_path)?;
    info!("知识库加载完成: {} 张表", kb.len());
    Ok(Pipeline::new(oracle, store, Arc::new(kb), settings.pipeline.clone()))
}

async fn serve(
    settings: Settings,
    oracle: Arc<dyn GenerativeOracle>,
    store: Arc<dyn RelationalStore>,
) -> anyhow::Result<()> {
    let state = Arc::new(ax_state::AppState {
        pipeline: load_pipeline(&settings, oracle, store)?,
    });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/api/chat", post(chat_query))
        .route("/api/knowledgebase", get(list_tables))
        .route("/api/health", get(health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    println!("🚀 nl2viz 运行在 http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
