use serde::{Deserialize, Serialize};

/// 子问题：问题片段 + 唯一目标表
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Subquestion {
    pub fragment: String,
    pub table: String,
}

/// 某个子问题选出的列
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ColumnSelection {
    /// 形如 `name of table:orders`
    pub table_label: String,
    pub column: String,
    pub usage: String,
}

impl ColumnSelection {
    pub fn new(table: &str, column: impl Into<String>, usage: impl Into<String>) -> Self {
        Self {
            table_label: format!("name of table:{}", table),
            column: column.into(),
            usage: usage.into(),
        }
    }
}

/// 提示词中使用的列清单：`[["name of table:t", "col", "usage"], ...]`
pub fn columns_to_prompt(columns: &[ColumnSelection]) -> String {
    let rows: Vec<[&str; 3]> = columns
        .iter()
        .map(|c| [c.table_label.as_str(), c.column.as_str(), c.usage.as_str()])
        .collect();
    serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_label_carries_table_name() {
        let c = ColumnSelection::new("order_payments", "payment_value", "sum for revenue");
        assert_eq!(c.table_label, "name of table:order_payments");
        assert_eq!(c.column, "payment_value");
    }

    #[test]
    fn prompt_rendering_is_a_json_list_of_triples() {
        let cols = vec![ColumnSelection::new("orders", "order_id", "key")];
        assert_eq!(
            columns_to_prompt(&cols),
            r#"[["name of table:orders","order_id","key"]]"#
        );
    }
}
