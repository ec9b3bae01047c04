use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 单个过滤条件 (表, 列, 谓词文本)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FilterTriple {
    pub table: String,
    pub column: String,
    /// 分类等值 token，或数值/日期比较、范围表达式
    pub predicate: String,
}

impl FilterTriple {
    pub fn new(table: impl Into<String>, column: impl Into<String>, predicate: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            predicate: predicate.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterPredicate {
    #[default]
    NoFilter,
    Filters(Vec<FilterTriple>),
}

impl FilterPredicate {
    pub fn is_empty(&self) -> bool {
        match self {
            FilterPredicate::NoFilter => true,
            FilterPredicate::Filters(list) => list.is_empty(),
        }
    }

    pub fn triples(&self) -> &[FilterTriple] {
        match self {
            FilterPredicate::NoFilter => &[],
            FilterPredicate::Filters(list) => list,
        }
    }

    /// 模型约定的线格式：`["no"]` 或 `["yes", ["t","c","p"], ...]`
    pub fn to_wire(&self) -> Value {
        match self {
            FilterPredicate::NoFilter => json!(["no"]),
            FilterPredicate::Filters(list) => {
                let mut out = vec![json!("yes")];
                out.extend(list.iter().map(|t| json!([t.table, t.column, t.predicate])));
                Value::Array(out)
            }
        }
    }

    pub fn to_prompt(&self) -> String {
        self.to_wire().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_matches_generator_protocol() {
        let f = FilterPredicate::Filters(vec![FilterTriple::new("orders", "order_status", "delivered")]);
        assert_eq!(f.to_prompt(), r#"["yes",["orders","order_status","delivered"]]"#);
        assert_eq!(FilterPredicate::NoFilter.to_prompt(), r#"["no"]"#);
    }

    #[test]
    fn empty_filter_list_counts_as_empty() {
        assert!(FilterPredicate::Filters(vec![]).is_empty());
        assert!(FilterPredicate::NoFilter.triples().is_empty());
    }
}
