//! 进程配置，来自环境变量（启动时由 dotenvy 加载 .env）。

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

/// 业务域分组 -> 表集合
pub type TableGroups = BTreeMap<String, Vec<String>>;

pub fn default_table_groups() -> TableGroups {
    let mut groups = TableGroups::new();
    groups.insert("customer".into(), vec!["customer".into(), "sellers".into()]);
    groups.insert(
        "orders".into(),
        vec![
            "order_items".into(),
            "order_payments".into(),
            "order_reviews".into(),
            "orders".into(),
        ],
    );
    groups.insert(
        "product".into(),
        vec!["products".into(), "category_translation".into()],
    );
    groups
}

#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// 设置时使用 Azure 的 URL 布局
    pub api_version: Option<String>,
    pub timeout: Option<Duration>,
}

/// 流水线行为参数
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_retries: u32,
    pub row_limit: u64,
    pub table_groups: TableGroups,
    pub default_group: String,
    pub excluded_column: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            row_limit: 2000,
            table_groups: default_table_groups(),
            default_group: "orders".into(),
            excluded_column: "customer_unique_id".into(),
        }
    }
}

impl PipelineSettings {
    pub fn default_tables(&self) -> Vec<String> {
        self.table_groups
            .get(&self.default_group)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub oracle: OracleSettings,
    pub knowledgebase_path: PathBuf,
    pub bind_addr: String,
    pub pipeline: PipelineSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            get(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnvVar(name))
        };
        let defaults = PipelineSettings::default();

        let table_groups = match get("TABLE_GROUPS") {
            Some(raw) => serde_json::from_str::<TableGroups>(&raw).map_err(|e| {
                ConfigError::InvalidValue { name: "TABLE_GROUPS", message: e.to_string() }
            })?,
            None => defaults.table_groups,
        };
        let default_group = get("DEFAULT_TABLE_GROUP").unwrap_or(defaults.default_group);
        if !table_groups.contains_key(&default_group) {
            return Err(ConfigError::InvalidValue {
                name: "DEFAULT_TABLE_GROUP",
                message: format!("group '{}' is not defined in TABLE_GROUPS", default_group),
            });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            oracle: OracleSettings {
                endpoint: required("ORACLE_ENDPOINT")?,
                api_key: get("ORACLE_API_KEY").unwrap_or_default(),
                model: get("ORACLE_MODEL").unwrap_or_else(|| "o3-mini".into()),
                api_version: get("ORACLE_API_VERSION").filter(|v| !v.is_empty()),
                timeout: parse_opt::<u64>(&get, "ORACLE_TIMEOUT_SECS")?.map(Duration::from_secs),
            },
            knowledgebase_path: get("KNOWLEDGEBASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("knowledgebase.json")),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            pipeline: PipelineSettings {
                max_retries: parse_opt(&get, "MAX_RETRIES")?.unwrap_or(defaults.max_retries),
                row_limit: parse_opt(&get, "ROW_LIMIT")?.unwrap_or(defaults.row_limit),
                table_groups,
                default_group,
                excluded_column: get("EXCLUDED_COLUMN").unwrap_or(defaults.excluded_column),
            },
        })
    }
}

fn parse_opt<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match get(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue { name, message: e.to_string() }),
    }
}
