//! 关系库访问：只读查询执行、列码值探测、列/类型目录。

use anyhow::anyhow;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use sqlx::{mysql::MySqlPoolOptions, postgres::PgPoolOptions, Executor, MySql, Pool, Postgres, Row};
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::infra::rows::{column_metas, mysql_row_values, pg_row_values};
use crate::models::result::ResultSet;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: String,
}

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// 执行只读语句
    async fn execute(&self, sql: &str) -> anyhow::Result<ResultSet>;

    /// 执行计划预检，仅用于诊断
    async fn explain(&self, sql: &str) -> anyhow::Result<()>;

    /// 列的去重非空取值（文本形式）
    async fn distinct_values(&self, table: &str, column: &str) -> anyhow::Result<Vec<String>>;

    /// 表的列名与类型，按定义顺序
    async fn column_catalog(&self, table: &str) -> anyhow::Result<Vec<ColumnSpec>>;

    /// 随机抽样若干行
    async fn sample_rows(&self, table: &str, limit: u32) -> anyhow::Result<ResultSet>;
}

pub enum DynamicPool {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
}

pub struct SqlStore {
    pool: DynamicPool,
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// 表名/列名来自模型输出，拼进 SQL 前必须是普通标识符
pub fn checked_identifier(name: &str) -> anyhow::Result<&str> {
    if identifier_regex().is_match(name) {
        Ok(name)
    } else {
        Err(anyhow!("invalid identifier: {:?}", name))
    }
}

impl SqlStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let scheme = database_url.split(':').next().unwrap_or_default().to_lowercase();
        let pool = match scheme.as_str() {
            "postgres" | "postgresql" => {
                DynamicPool::Postgres(PgPoolOptions::new().max_connections(5).connect(database_url).await?)
            }
            "mysql" | "mariadb" => {
                DynamicPool::MySql(MySqlPoolOptions::new().max_connections(5).connect(database_url).await?)
            }
            other => return Err(anyhow!("Unsupported DB type: {}", other)),
        };
        info!("关系库连接池已建立: {}", scheme);
        Ok(Self { pool })
    }

    fn quote(&self, ident: &str) -> String {
        match self.pool {
            DynamicPool::Postgres(_) => format!("\"{}\"", ident),
            DynamicPool::MySql(_) => format!("`{}`", ident),
        }
    }
}

#[async_trait]
impl RelationalStore for SqlStore {
    async fn execute(&self, sql: &str) -> anyhow::Result<ResultSet> {
        let rs = match &self.pool {
            DynamicPool::Postgres(p) => {
                let rows = sqlx::query(sql).fetch_all(p).await?;
                match rows.first() {
                    Some(first) => ResultSet::new(
                        column_metas(first.columns()),
                        rows.iter().map(pg_row_values).collect(),
                    ),
                    // 空结果时通过 describe 补齐列信息
                    None => {
                        let columns = p
                            .describe(sql)
                            .await
                            .map(|d| column_metas(d.columns()))
                            .unwrap_or_default();
                        ResultSet::new(columns, vec![])
                    }
                }
            }
            DynamicPool::MySql(p) => {
                let rows = sqlx::query(sql).fetch_all(p).await?;
                match rows.first() {
                    Some(first) => ResultSet::new(
                        column_metas(first.columns()),
                        rows.iter().map(mysql_row_values).collect(),
                    ),
                    None => {
                        let columns = p
                            .describe(sql)
                            .await
                            .map(|d| column_metas(d.columns()))
                            .unwrap_or_default();
                        ResultSet::new(columns, vec![])
                    }
                }
            }
        };
        debug!("查询返回 {} 行 {} 列", rs.len(), rs.columns.len());
        Ok(rs)
    }

    async fn explain(&self, sql: &str) -> anyhow::Result<()> {
        let stmt = format!("EXPLAIN {}", sql);
        match &self.pool {
            DynamicPool::Postgres(p) => {
                sqlx::query(&stmt).fetch_all(p).await?;
            }
            DynamicPool::MySql(p) => {
                sqlx::query(&stmt).fetch_all(p).await?;
            }
        }
        Ok(())
    }

    async fn distinct_values(&self, table: &str, column: &str) -> anyhow::Result<Vec<String>> {
        let table = self.quote(checked_identifier(table)?);
        let column = self.quote(checked_identifier(column)?);
        let vals = match &self.pool {
            DynamicPool::Postgres(p) => {
                let sql = format!(
                    "SELECT DISTINCT ({col})::text AS v FROM {table} WHERE {col} IS NOT NULL",
                    col = column,
                    table = table
                );
                sqlx::query(&sql)
                    .fetch_all(p)
                    .await?
                    .into_iter()
                    .filter_map(|r| r.try_get::<String, _>("v").ok())
                    .collect::<Vec<_>>()
            }
            DynamicPool::MySql(p) => {
                let sql = format!(
                    "SELECT DISTINCT CAST({col} AS CHAR) AS v FROM {table} WHERE {col} IS NOT NULL",
                    col = column,
                    table = table
                );
                sqlx::query(&sql)
                    .fetch_all(p)
                    .await?
                    .into_iter()
                    .filter_map(|r| r.try_get::<String, _>("v").ok())
                    .collect::<Vec<_>>()
            }
        };
        debug!("码值探测 {}.{}: {} 个取值", table, column, vals.len());
        Ok(vals)
    }

    async fn column_catalog(&self, table: &str) -> anyhow::Result<Vec<ColumnSpec>> {
        let table = checked_identifier(table)?;
        let specs = match &self.pool {
            DynamicPool::Postgres(p) => sqlx::query(
                "SELECT column_name::text, data_type::text FROM information_schema.columns \
                 WHERE table_name = $1 ORDER BY ordinal_position",
            )
            .bind(table)
            .fetch_all(p)
            .await?
            .into_iter()
            .filter_map(|r| {
                Some(ColumnSpec {
                    name: r.try_get::<String, _>(0).ok()?,
                    dtype: r.try_get::<String, _>(1).ok()?.to_uppercase(),
                })
            })
            .collect(),
            DynamicPool::MySql(p) => sqlx::query(
                "SELECT CAST(COLUMN_NAME AS CHAR), CAST(DATA_TYPE AS CHAR) FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
            )
            .bind(table)
            .fetch_all(p)
            .await?
            .into_iter()
            .filter_map(|r| {
                Some(ColumnSpec {
                    name: r.try_get::<String, _>(0).ok()?,
                    dtype: r.try_get::<String, _>(1).ok()?.to_uppercase(),
                })
            })
            .collect(),
        };
        Ok(specs)
    }

    async fn sample_rows(&self, table: &str, limit: u32) -> anyhow::Result<ResultSet> {
        let quoted = self.quote(checked_identifier(table)?);
        let random = match self.pool {
            DynamicPool::Postgres(_) => "RANDOM()",
            DynamicPool::MySql(_) => "RAND()",
        };
        self.execute(&format!("SELECT * FROM {} ORDER BY {} LIMIT {}", quoted, random, limit))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_pass() {
        assert!(checked_identifier("order_status").is_ok());
        assert!(checked_identifier("_tmp1").is_ok());
    }

    #[test]
    fn injection_attempts_fail() {
        for bad in ["orders; DROP TABLE x", "a b", "1col", "", "x\"y", "t.c"] {
            assert!(checked_identifier(bad).is_err(), "{bad}");
        }
    }
}
