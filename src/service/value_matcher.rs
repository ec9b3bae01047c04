//! 谓词码值匹配：把分类谓词对齐到数据库中真实存在的取值。

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, instrument, warn};

use crate::core::fuzzy::best_match;
use crate::infra::store::{checked_identifier, RelationalStore};
use crate::models::filter::{FilterPredicate, FilterTriple};

fn comparison_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bbetween\b|!=|<>|<=|>=|<|>|\bnot\b|\bin\s*\(|\blike\b|\bbefore\b|\bafter\b|\d{4}-\d{2}-\d{2}",
        )
        .unwrap()
    })
}

/// 分类谓词：含字母，且不是比较、否定、集合、模式或日期表达式
pub fn is_categorical(predicate: &str) -> bool {
    predicate.chars().any(char::is_alphabetic) && !comparison_regex().is_match(predicate)
}

pub struct ValueMatcher<'a> {
    store: &'a dyn RelationalStore,
}

impl<'a> ValueMatcher<'a> {
    pub fn new(store: &'a dyn RelationalStore) -> Self {
        Self { store }
    }

    #[instrument(skip_all, fields(filters = filters.triples().len()))]
    pub async fn resolve(&self, filters: &FilterPredicate) -> FilterPredicate {
        let FilterPredicate::Filters(triples) = filters else {
            return FilterPredicate::NoFilter;
        };

        let mut matched = Vec::with_capacity(triples.len());
        for triple in triples {
            matched.push(self.resolve_one(triple).await);
        }
        FilterPredicate::Filters(matched)
    }

    async fn resolve_one(&self, triple: &FilterTriple) -> FilterTriple {
        if !is_categorical(&triple.predicate) {
            debug!("非分类谓词，保持原样: {}", triple.predicate);
            return triple.clone();
        }
        if let Err(e) = checked_identifier(&triple.table).and_then(|_| checked_identifier(&triple.column)) {
            warn!("跳过码值匹配: {}", e);
            return triple.clone();
        }

        let values = match self.store.distinct_values(&triple.table, &triple.column).await {
            Ok(v) => v,
            Err(e) => {
                warn!("读取 {}.{} 码值失败: {:#}", triple.table, triple.column, e);
                return triple.clone();
            }
        };

        match best_match(&triple.predicate, &values) {
            Some((value, score)) => {
                info!("码值匹配 {:?} -> {:?} (score {:.1})", triple.predicate, value, score);
                FilterTriple::new(&triple.table, &triple.column, value)
            }
            None => triple.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::testing::ScriptedStore;

    #[test]
    fn categorical_detection() {
        assert!(is_categorical("deliverd"));
        assert!(is_categorical("credit card"));
        assert!(!is_categorical("> 100"));
        assert!(!is_categorical("2018"));
        assert!(!is_categorical("between 2017-01-01 and 2017-12-31"));
        assert!(!is_categorical("after March"));
        assert!(!is_categorical("2018-01-01"));
        assert!(!is_categorical("!= canceled"));
        assert!(!is_categorical("<> canceled"));
        assert!(!is_categorical("not canceled"));
        assert!(!is_categorical("not in (canceled, unavailable)"));
        assert!(!is_categorical("in ('SP', 'RJ')"));
        assert!(!is_categorical("like '%sao%'"));
        assert!(is_categorical("sao paulo"));
    }

    #[tokio::test]
    async fn negated_predicate_is_kept_as_written() {
        let store = ScriptedStore::new().with_distinct("orders", "order_status", &["canceled", "delivered"]);
        let filters = FilterPredicate::Filters(vec![FilterTriple::new("orders", "order_status", "!= canceled")]);
        let out = ValueMatcher::new(&store).resolve(&filters).await;
        assert_eq!(out.triples()[0].predicate, "!= canceled");
        assert!(store.distinct_calls().is_empty());
    }

    #[tokio::test]
    async fn misspelled_value_is_replaced() {
        let store = ScriptedStore::new().with_distinct(
            "orders",
            "order_status",
            &["canceled", "delivered", "invoiced", "shipped"],
        );
        let filters = FilterPredicate::Filters(vec![FilterTriple::new("orders", "order_status", "deliverd")]);
        let out = ValueMatcher::new(&store).resolve(&filters).await;
        assert_eq!(out.triples()[0].predicate, "delivered");
        assert_eq!(store.distinct_calls(), vec![("orders".to_string(), "order_status".to_string())]);
    }

    #[tokio::test]
    async fn range_predicates_skip_the_store() {
        let store = ScriptedStore::new();
        let filters = FilterPredicate::Filters(vec![
            FilterTriple::new("order_payments", "payment_value", "> 100"),
            FilterTriple::new("orders", "order_purchase_timestamp", "between 2017-01-01 and 2017-06-30"),
        ]);
        let out = ValueMatcher::new(&store).resolve(&filters).await;
        assert_eq!(out, filters);
        assert!(store.distinct_calls().is_empty());
    }

    #[tokio::test]
    async fn empty_column_keeps_original_text() {
        let store = ScriptedStore::new();
        let filters = FilterPredicate::Filters(vec![FilterTriple::new("customer", "customer_city", "sao paulo")]);
        let out = ValueMatcher::new(&store).resolve(&filters).await;
        assert_eq!(out.triples()[0].predicate, "sao paulo");
    }

    #[tokio::test]
    async fn suspicious_identifiers_are_not_queried() {
        let store = ScriptedStore::new();
        let filters = FilterPredicate::Filters(vec![FilterTriple::new("orders; drop", "status", "x")]);
        let out = ValueMatcher::new(&store).resolve(&filters).await;
        assert_eq!(out, filters);
        assert!(store.distinct_calls().is_empty());
    }

    #[tokio::test]
    async fn no_filter_stays_no_filter() {
        let store = ScriptedStore::new();
        let out = ValueMatcher::new(&store).resolve(&FilterPredicate::NoFilter).await;
        assert_eq!(out, FilterPredicate::NoFilter);
    }
}
