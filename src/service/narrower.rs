//! 表范围收敛：问题 -> 业务域表集合 -> 子问题 -> 每个子问题的列。

use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::core::parsing::{parse_nested_list, value_text};
use crate::core::prompts;
use crate::infra::config::PipelineSettings;
use crate::infra::oracle::GenerativeOracle;
use crate::models::knowledge::KnowledgeBase;
use crate::models::schema::{ColumnSelection, Subquestion};
use crate::service::ask;

pub struct SchemaNarrower<'a> {
    oracle: &'a dyn GenerativeOracle,
    kb: &'a KnowledgeBase,
    settings: &'a PipelineSettings,
}

impl<'a> SchemaNarrower<'a> {
    pub fn new(oracle: &'a dyn GenerativeOracle, kb: &'a KnowledgeBase, settings: &'a PipelineSettings) -> Self {
        Self { oracle, kb, settings }
    }

    /// 问题 -> 表集合（去重，保留首次出现顺序）；无法识别时落到默认分组
    #[instrument(skip(self))]
    pub async fn narrow(&self, question: &str) -> Vec<String> {
        let payload = format!(
            "Domain groups (group -> tables):\n{}\n\nUser question:\n{}",
            json!(self.settings.table_groups),
            question
        );
        let groups: Vec<String> = ask(self.oracle, "narrow", prompts::TABLE_ROUTER, &payload)
            .await
            .and_then(|raw| parse_nested_list(&raw))
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_lowercase()))
            .filter(|g| self.settings.table_groups.contains_key(g))
            .collect();

        let groups = if groups.is_empty() {
            warn!("分组识别失败，回退到默认分组 {}", self.settings.default_group);
            vec![self.settings.default_group.clone()]
        } else {
            groups
        };

        let mut tables: Vec<String> = Vec::new();
        for g in &groups {
            for t in self.settings.table_groups.get(g).into_iter().flatten() {
                if !tables.contains(t) {
                    tables.push(t.clone());
                }
            }
        }
        info!("业务分组 {:?} -> 表 {:?}", groups, tables);
        tables
    }

    /// 问题 + 表集合 -> 子问题列表，每个子问题绑定一张表
    #[instrument(skip(self))]
    pub async fn decompose(&self, question: &str, tables: &[String]) -> Vec<Subquestion> {
        let described: serde_json::Map<String, Value> = tables
            .iter()
            .filter_map(|t| self.kb.get(t).map(|k| (t.clone(), json!(k.description()))))
            .collect();
        if described.is_empty() {
            warn!("知识库中没有任何候选表的描述: {:?}", tables);
            return Vec::new();
        }

        let payload = format!(
            "Table List:\n{}\n\nUser question:\n{}",
            Value::Object(described),
            question
        );
        let entries = ask(self.oracle, "decompose", prompts::SUBQUESTION, &payload)
            .await
            .and_then(|raw| parse_nested_list(&raw))
            .unwrap_or_default();
        let subquestions = normalize_subquestions(&entries, self.kb);
        info!("拆分出 {} 个子问题", subquestions.len());
        subquestions
    }

    /// 每个子问题选列，排除隐私列与知识库中不存在的列
    #[instrument(skip(self, subquestions), fields(subquestions = subquestions.len()))]
    pub async fn select_columns(&self, question: &str, subquestions: &[Subquestion]) -> Vec<ColumnSelection> {
        let mut selected = Vec::new();
        for sq in subquestions {
            let Some(table) = self.kb.get(&sq.table) else {
                continue;
            };
            let payload = format!(
                "Column list:\n{}\n\nsubquestion:\n{}\n\nMain question:\n{}",
                json!(table.columns()),
                sq.fragment,
                question
            );
            let entries = ask(self.oracle, "select_columns", prompts::COLUMN_SELECTOR, &payload)
                .await
                .and_then(|raw| parse_nested_list(&raw))
                .unwrap_or_default();

            for entry in &entries {
                let Value::Array(pair) = entry else { continue };
                if pair.len() < 2 {
                    continue;
                }
                let raw_column = value_text(&pair[0]);
                let column = raw_column
                    .strip_prefix(&format!("{}.", sq.table))
                    .unwrap_or(&raw_column)
                    .to_string();
                if column.is_empty() || column.eq_ignore_ascii_case(&self.settings.excluded_column) {
                    continue;
                }
                let known = table.columns().is_empty() || table.columns().iter().any(|(c, _)| *c == column);
                if !known {
                    warn!("丢弃不存在的列 {}.{}", sq.table, column);
                    continue;
                }
                selected.push(ColumnSelection::new(&sq.table, column, value_text(&pair[1])));
            }
        }
        info!("共选出 {} 列", selected.len());
        selected
    }
}

/// 只保留 [片段, 表] 形状且表在知识库中的条目
pub fn normalize_subquestions(entries: &[Value], kb: &KnowledgeBase) -> Vec<Subquestion> {
    entries
        .iter()
        .filter_map(|e| match e {
            Value::Array(pair) if pair.len() >= 2 => Some((value_text(&pair[0]), value_text(&pair[1]))),
            _ => None,
        })
        .filter(|(fragment, table)| !fragment.is_empty() && kb.contains(table))
        .map(|(fragment, table)| Subquestion { fragment, table })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::testing::{olist_kb, ScriptedOracle};

    #[tokio::test]
    async fn narrow_unions_groups_without_duplicates() {
        let oracle = ScriptedOracle::new().reply(prompts::TABLE_ROUTER, r#"["orders", "customer", "orders"]"#);
        let kb = olist_kb();
        let settings = PipelineSettings::default();
        let tables = SchemaNarrower::new(&oracle, &kb, &settings).narrow("sales by city").await;
        assert_eq!(
            tables,
            vec!["order_items", "order_payments", "order_reviews", "orders", "customer", "sellers"]
        );
    }

    #[tokio::test]
    async fn narrow_falls_back_to_default_group() {
        for reply in ["nonsense", r#"["weather"]"#] {
            let oracle = ScriptedOracle::new().reply(prompts::TABLE_ROUTER, reply);
            let kb = olist_kb();
            let settings = PipelineSettings::default();
            let tables = SchemaNarrower::new(&oracle, &kb, &settings).narrow("q").await;
            assert_eq!(tables, settings.default_tables());
        }
    }

    #[tokio::test]
    async fn decompose_drops_malformed_entries() {
        let oracle = ScriptedOracle::new().reply(
            prompts::SUBQUESTION,
            r#"[["total sales", "order_payments"], ["bridge", "orders"], ["only one"], ["", "orders"], ["x", "ghost_table"], "junk"]"#,
        );
        let kb = olist_kb();
        let settings = PipelineSettings::default();
        let subs = SchemaNarrower::new(&oracle, &kb, &settings)
            .decompose("monthly sales", &["orders".into(), "order_payments".into()])
            .await;
        assert_eq!(
            subs,
            vec![
                Subquestion { fragment: "total sales".into(), table: "order_payments".into() },
                Subquestion { fragment: "bridge".into(), table: "orders".into() },
            ]
        );
        let payload = &oracle.payloads(prompts::SUBQUESTION)[0];
        assert!(payload.contains("Payments per order"));
    }

    #[tokio::test]
    async fn decompose_unparseable_is_empty() {
        let oracle = ScriptedOracle::new().reply(prompts::SUBQUESTION, "Sorry, I can't do that");
        let kb = olist_kb();
        let settings = PipelineSettings::default();
        let subs = SchemaNarrower::new(&oracle, &kb, &settings)
            .decompose("q", &["orders".into()])
            .await;
        assert!(subs.is_empty());
    }

    #[tokio::test]
    async fn select_columns_excludes_private_and_unknown_columns() {
        let oracle = ScriptedOracle::new().reply(
            prompts::COLUMN_SELECTOR,
            r#"[["customer.customer_city", "group by city"], ["customer_unique_id", "person"], ["zip", "made up"], ["customer_id"]]"#,
        );
        let kb = olist_kb();
        let settings = PipelineSettings::default();
        let cols = SchemaNarrower::new(&oracle, &kb, &settings)
            .select_columns(
                "orders per city",
                &[Subquestion { fragment: "city".into(), table: "customer".into() }],
            )
            .await;
        assert_eq!(cols, vec![ColumnSelection::new("customer", "customer_city", "group by city")]);
    }

    #[tokio::test]
    async fn select_columns_survives_oracle_failure() {
        let oracle = ScriptedOracle::new().fail(prompts::COLUMN_SELECTOR, "timeout");
        let kb = olist_kb();
        let settings = PipelineSettings::default();
        let cols = SchemaNarrower::new(&oracle, &kb, &settings)
            .select_columns("q", &[Subquestion { fragment: "f".into(), table: "orders".into() }])
            .await;
        assert!(cols.is_empty());
    }
}
