//! 过滤条件抽取：问题 + 已选列 -> `["no"]` 或 `["yes", [表, 列, 谓词], ...]`。

use serde_json::Value;
use tracing::{info, instrument};

use crate::core::parsing::{parse_nested_list, value_text};
use crate::core::prompts;
use crate::infra::oracle::GenerativeOracle;
use crate::models::filter::{FilterPredicate, FilterTriple};
use crate::models::schema::{columns_to_prompt, ColumnSelection};
use crate::service::ask;

pub struct FilterExtractor<'a> {
    oracle: &'a dyn GenerativeOracle,
}

impl<'a> FilterExtractor<'a> {
    pub fn new(oracle: &'a dyn GenerativeOracle) -> Self {
        Self { oracle }
    }

    /// 返回 (模型原始输出, 解析后的过滤条件)
    #[instrument(skip(self, columns))]
    pub async fn extract(&self, question: &str, columns: &[ColumnSelection]) -> (String, FilterPredicate) {
        let payload = format!(
            "User question:\n{}\n\nAvailable tables and columns:\n{}",
            question,
            columns_to_prompt(columns)
        );
        let raw = ask(self.oracle, "extract_filters", prompts::FILTER_EXTRACTOR, &payload)
            .await
            .unwrap_or_default();
        let predicate = parse_filter_response(&raw);
        info!("过滤条件: {}", predicate.to_prompt());
        (raw, predicate)
    }
}

/// `["yes", [[t,c,p], ...]]` 展平为 `["yes", [t,c,p], ...]`；已是扁平形状时原样返回
pub fn flatten_filter_shape(list: Vec<Value>) -> Vec<Value> {
    let wrapped = list.len() == 2
        && list[0].as_str().is_some_and(|s| s.eq_ignore_ascii_case("yes"))
        && matches!(&list[1], Value::Array(inner) if !inner.is_empty() && inner.iter().all(Value::is_array));

    if !wrapped {
        return list;
    }
    let mut it = list.into_iter();
    let head = it.next().unwrap_or(Value::Null);
    match it.next() {
        Some(Value::Array(inner)) => std::iter::once(head).chain(inner).collect(),
        _ => vec![head],
    }
}

/// 无法解析、以 "no" 开头或没有合法三元组时都视为无过滤
pub fn parse_filter_response(raw: &str) -> FilterPredicate {
    let Some(list) = parse_nested_list(raw) else {
        return FilterPredicate::NoFilter;
    };
    let list = flatten_filter_shape(list);
    let is_yes = list
        .first()
        .and_then(Value::as_str)
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("yes"));
    if !is_yes {
        return FilterPredicate::NoFilter;
    }

    let triples: Vec<FilterTriple> = list[1..]
        .iter()
        .filter_map(|entry| match entry {
            Value::Array(parts) if parts.len() >= 3 => {
                let table = value_text(&parts[0]);
                let table = table.strip_prefix("name of table:").unwrap_or(&table).trim().to_string();
                let column = value_text(&parts[1]);
                let predicate = value_text(&parts[2]);
                (!table.is_empty() && !column.is_empty() && !predicate.is_empty())
                    .then(|| FilterTriple::new(table, column, predicate))
            }
            _ => None,
        })
        .collect();

    if triples.is_empty() {
        FilterPredicate::NoFilter
    } else {
        FilterPredicate::Filters(triples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::testing::ScriptedOracle;
    use serde_json::json;

    #[test]
    fn wrapped_shape_is_flattened() {
        let wrapped = vec![json!("yes"), json!([["orders", "order_status", "deliverd"], ["customer", "customer_state", "SP"]])];
        let flat = flatten_filter_shape(wrapped);
        assert_eq!(
            flat,
            vec![
                json!("yes"),
                json!(["orders", "order_status", "deliverd"]),
                json!(["customer", "customer_state", "SP"]),
            ]
        );
        // 再次展平不变
        assert_eq!(flatten_filter_shape(flat.clone()), flat);
    }

    #[test]
    fn single_flat_triple_is_not_mistaken_for_wrapper() {
        let flat = vec![json!("yes"), json!(["orders", "order_status", "delivered"])];
        assert_eq!(flatten_filter_shape(flat.clone()), flat);
    }

    #[test]
    fn parses_both_shapes_to_same_predicate() {
        let a = parse_filter_response(r#"["yes", ["orders", "order_status", "deliverd"]]"#);
        let b = parse_filter_response(r#"["yes", [["orders", "order_status", "deliverd"]]]"#);
        assert_eq!(a, b);
        assert_eq!(a.triples()[0], FilterTriple::new("orders", "order_status", "deliverd"));
    }

    #[test]
    fn no_and_garbage_mean_no_filter() {
        assert_eq!(parse_filter_response(r#"["no"]"#), FilterPredicate::NoFilter);
        assert_eq!(parse_filter_response("I think there are none"), FilterPredicate::NoFilter);
        assert_eq!(parse_filter_response(r#"["yes", ["orders", "order_status"]]"#), FilterPredicate::NoFilter);
    }

    #[test]
    fn table_label_prefix_is_stripped() {
        let p = parse_filter_response(r#"["yes", ["name of table:orders", "order_status", "shipped"]]"#);
        assert_eq!(p.triples()[0].table, "orders");
    }

    #[tokio::test]
    async fn extract_keeps_raw_text() {
        let oracle = ScriptedOracle::new().reply(
            prompts::FILTER_EXTRACTOR,
            "```json\n['yes', ['orders', 'order_status', 'deliverd']]\n```",
        );
        let cols = vec![ColumnSelection::new("orders", "order_status", "filter")];
        let (raw, predicate) = FilterExtractor::new(&oracle).extract("deliverd orders", &cols).await;
        assert!(raw.contains("deliverd"));
        assert_eq!(predicate.triples().len(), 1);
        assert!(oracle.payloads(prompts::FILTER_EXTRACTOR)[0].contains("name of table:orders"));
    }

    #[tokio::test]
    async fn oracle_failure_means_no_filter() {
        let oracle = ScriptedOracle::new().fail(prompts::FILTER_EXTRACTOR, "503");
        let (raw, predicate) = FilterExtractor::new(&oracle).extract("q", &[]).await;
        assert!(raw.is_empty());
        assert!(predicate.is_empty());
    }
}
