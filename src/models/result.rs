use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    /// 数据库原生类型名，如 "INT4", "NUMERIC", "VARCHAR"
    pub type_name: String,
}

/// 查询结果：按顺序的列 + 行（每行与列一一对应）
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// 行转为 {列名: 值} 对象
    pub fn row_object(&self, idx: usize) -> Option<Map<String, Value>> {
        let row = self.rows.get(idx)?;
        Some(
            self.columns
                .iter()
                .zip(row.iter())
                .map(|(c, v)| (c.name.clone(), v.clone()))
                .collect(),
        )
    }

    /// 结构描述，每列一行 `name: TYPE`；空结果返回 "EMPTY"
    pub fn structure(&self) -> String {
        if self.is_empty() {
            return "EMPTY".to_string();
        }
        self.columns
            .iter()
            .map(|c| format!("{}: {}", c.name, c.type_name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 前 n 行样本 (JSON 记录)；空结果返回 "EMPTY"
    pub fn sample(&self, n: usize) -> String {
        if self.is_empty() {
            return "EMPTY".to_string();
        }
        let records: Vec<Value> = (0..self.rows.len().min(n))
            .filter_map(|i| self.row_object(i).map(Value::Object))
            .collect();
        serde_json::to_string_pretty(&records).unwrap_or_default()
    }
}
