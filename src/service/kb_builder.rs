//! 离线构建知识库：抽样行 + 列目录 -> 模型标注 -> `table -> [描述, [[列, 描述], ...]]`。

use anyhow::Context;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::core::parsing::{parse_json_object, value_text};
use crate::core::prompts;
use crate::infra::oracle::GenerativeOracle;
use crate::infra::store::{ColumnSpec, RelationalStore};
use crate::models::knowledge::{KnowledgeBase, TableKnowledge};
use crate::models::result::ResultSet;
use crate::service::ask;

const SAMPLE_SIZE: u32 = 100;
const SAMPLE_ROWS_IN_PROMPT: usize = 10;
const SAMPLES_PER_COLUMN: usize = 5;

/// 人工维护的表描述，作为模型标注的基础
pub fn base_table_descriptions() -> BTreeMap<String, String> {
    [
        ("customer", "Customers and their location (city, state, zip prefix)."),
        ("sellers", "Marketplace sellers and their location."),
        ("orders", "One row per order: customer, status and lifecycle timestamps."),
        ("order_items", "Items of each order with product, seller, price and freight."),
        ("order_payments", "Payments per order: payment type, installments and value."),
        ("order_reviews", "Customer reviews per order with score and comments."),
        ("products", "Product catalog with category and physical attributes."),
        ("category_translation", "Translation of product category names to English."),
    ]
    .into_iter()
    .map(|(t, d)| (t.to_string(), d.to_string()))
    .collect()
}

pub struct KnowledgeBaseBuilder<'a> {
    oracle: &'a dyn GenerativeOracle,
    store: &'a dyn RelationalStore,
}

impl<'a> KnowledgeBaseBuilder<'a> {
    pub fn new(oracle: &'a dyn GenerativeOracle, store: &'a dyn RelationalStore) -> Self {
        Self { oracle, store }
    }

    /// 表读取失败直接返回错误；模型失败时用列目录生成的描述兜底
    pub async fn build(&self, tables: &[String], base: &BTreeMap<String, String>) -> anyhow::Result<KnowledgeBase> {
        let mut out = Vec::with_capacity(tables.len());
        for table in tables {
            let base_desc = base.get(table).map(String::as_str).unwrap_or_default();
            let knowledge = self.annotate_table(table, base_desc).await?;
            info!("{}: {} 列已标注", table, knowledge.columns().len());
            out.push((table.clone(), knowledge));
        }
        Ok(KnowledgeBase::from_tables(out))
    }

    #[instrument(skip(self, base_desc))]
    async fn annotate_table(&self, table: &str, base_desc: &str) -> anyhow::Result<TableKnowledge> {
        let sample = self
            .store
            .sample_rows(table, SAMPLE_SIZE)
            .await
            .with_context(|| format!("sampling rows of {}", table))?;
        let specs = self
            .store
            .column_catalog(table)
            .await
            .with_context(|| format!("reading column catalog of {}", table))?;

        let fallback: Vec<(String, String)> = specs
            .iter()
            .map(|s| (s.name.clone(), fallback_description(s, &column_samples(&sample, &s.name))))
            .collect();

        let spec_payload: Vec<Value> = specs
            .iter()
            .map(|s| json!({"name": s.name, "dtype": s.dtype, "samples": column_samples(&sample, &s.name)}))
            .collect();
        let payload = format!(
            "SQL table description:\n{}\n\nColumn specs (names are authoritative):\n{}\n\nA few random sample rows:\n{}",
            base_desc,
            Value::Array(spec_payload),
            sample.sample(SAMPLE_ROWS_IN_PROMPT)
        );

        let Some(parsed) = ask(self.oracle, "annotate", prompts::KB_ANNOTATOR, &payload)
            .await
            .and_then(|raw| parse_json_object(&raw))
        else {
            warn!("{} 标注结果无法解析，使用列目录兜底", table);
            return Ok(TableKnowledge::new(base_desc, fallback));
        };

        let description = parsed
            .get("table_description")
            .map(value_text)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| base_desc.to_string());

        let mut annotated: BTreeMap<String, String> = BTreeMap::new();
        if let Some(Value::Array(entries)) = parsed.get("columns") {
            for entry in entries {
                let Value::Array(pair) = entry else { continue };
                if pair.len() < 2 {
                    continue;
                }
                let name = value_text(&pair[0]);
                if specs.iter().any(|s| s.name == name) {
                    annotated.insert(name, value_text(&pair[1]));
                } else {
                    warn!("丢弃模型虚构的列 {}.{}", table, name);
                }
            }
        }

        // 按目录顺序输出，模型漏掉的列用兜底描述
        let columns = fallback
            .into_iter()
            .map(|(name, fb)| {
                let desc = annotated.remove(&name).filter(|d| !d.is_empty()).unwrap_or(fb);
                (name, desc)
            })
            .collect();
        Ok(TableKnowledge::new(description, columns))
    }
}

/// 抽样中某列至多 5 个不同的非空取值
fn column_samples(sample: &ResultSet, column: &str) -> Vec<String> {
    let Some(idx) = sample.column_index(column) else {
        return Vec::new();
    };
    let mut seen: Vec<String> = Vec::new();
    for row in &sample.rows {
        let text = row.get(idx).map(value_text).unwrap_or_default();
        if !text.is_empty() && !seen.contains(&text) {
            seen.push(text);
            if seen.len() == SAMPLES_PER_COLUMN {
                break;
            }
        }
    }
    seen
}

fn fallback_description(spec: &ColumnSpec, samples: &[String]) -> String {
    if samples.is_empty() {
        format!("{} column.", spec.dtype)
    } else {
        format!("{} column, e.g. {}.", spec.dtype, samples.iter().take(2).cloned().collect::<Vec<_>>().join(", "))
    }
}
