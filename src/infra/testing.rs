//! 测试用的脚本化协作方：按系统指令排队的模型回复、可编程的关系库。

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::infra::oracle::GenerativeOracle;
use crate::infra::store::{ColumnSpec, RelationalStore};
use crate::models::knowledge::{KnowledgeBase, TableKnowledge};
use crate::models::result::{ColumnMeta, ResultSet};

#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<HashMap<String, VecDeque<anyhow::Result<String>>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为某条系统指令追加一条回复
    pub fn reply(self, system: &str, text: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(system.to_string())
            .or_default()
            .push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, system: &str, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(system.to_string())
            .or_default()
            .push_back(Err(anyhow!(message.to_string())));
        self
    }

    /// 某条系统指令收到的全部用户载荷
    pub fn payloads(&self, system: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == system)
            .map(|(_, u)| u.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeOracle for ScriptedOracle {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        self.replies
            .lock()
            .unwrap()
            .get_mut(system)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Err(anyhow!("no scripted reply left")))
    }
}

#[derive(Default)]
pub struct ScriptedStore {
    outcomes: Mutex<VecDeque<Result<ResultSet, String>>>,
    executed: Mutex<Vec<String>>,
    distinct: HashMap<(String, String), Vec<String>>,
    distinct_calls: Mutex<Vec<(String, String)>>,
    catalogs: HashMap<String, Vec<ColumnSpec>>,
    samples: HashMap<String, ResultSet>,
    explain_fails: bool,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returns(self, rs: ResultSet) -> Self {
        self.outcomes.lock().unwrap().push_back(Ok(rs));
        self
    }

    pub fn errors(self, message: &str) -> Self {
        self.outcomes.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn with_distinct(mut self, table: &str, column: &str, values: &[&str]) -> Self {
        self.distinct.insert(
            (table.to_string(), column.to_string()),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn with_catalog(mut self, table: &str, specs: Vec<ColumnSpec>, sample: ResultSet) -> Self {
        self.catalogs.insert(table.to_string(), specs);
        self.samples.insert(table.to_string(), sample);
        self
    }

    pub fn failing_explain(mut self) -> Self {
        self.explain_fails = true;
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn distinct_calls(&self) -> Vec<(String, String)> {
        self.distinct_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelationalStore for ScriptedStore {
    async fn execute(&self, sql: &str) -> anyhow::Result<ResultSet> {
        self.executed.lock().unwrap().push(sql.to_string());
        match self.outcomes.lock().unwrap().pop_front() {
            Some(Ok(rs)) => Ok(rs),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("no scripted outcome left")),
        }
    }

    async fn explain(&self, _sql: &str) -> anyhow::Result<()> {
        if self.explain_fails {
            return Err(anyhow!("EXPLAIN not permitted"));
        }
        Ok(())
    }

    async fn distinct_values(&self, table: &str, column: &str) -> anyhow::Result<Vec<String>> {
        self.distinct_calls
            .lock()
            .unwrap()
            .push((table.to_string(), column.to_string()));
        Ok(self
            .distinct
            .get(&(table.to_string(), column.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn column_catalog(&self, table: &str) -> anyhow::Result<Vec<ColumnSpec>> {
        self.catalogs
            .get(table)
            .cloned()
            .ok_or_else(|| anyhow!("Table '{}' doesn't exist", table))
    }

    async fn sample_rows(&self, table: &str, _limit: u32) -> anyhow::Result<ResultSet> {
        Ok(self.samples.get(table).cloned().unwrap_or_default())
    }
}

/// 小型电商知识库，列描述统一为 "<列名> column"
pub fn olist_kb() -> KnowledgeBase {
    let cols = |names: &[&str]| names.iter().map(|n| (n.to_string(), format!("{n} column"))).collect();
    KnowledgeBase::from_tables([
        (
            "orders".to_string(),
            TableKnowledge::new(
                "Order lifecycle",
                cols(&["order_id", "customer_id", "order_status", "order_purchase_timestamp"]),
            ),
        ),
        (
            "order_payments".to_string(),
            TableKnowledge::new("Payments per order", cols(&["order_id", "payment_type", "payment_value"])),
        ),
        (
            "order_items".to_string(),
            TableKnowledge::new("Items per order", cols(&["order_id", "seller_id", "price"])),
        ),
        (
            "customer".to_string(),
            TableKnowledge::new(
                "Customers",
                cols(&["customer_id", "customer_unique_id", "customer_city", "customer_state"]),
            ),
        ),
        (
            "sellers".to_string(),
            TableKnowledge::new("Sellers", cols(&["seller_id", "seller_city"])),
        ),
    ])
}

/// 按 (列名, 类型, 行) 快速构造结果集
pub fn result_set(columns: &[(&str, &str)], rows: Vec<Vec<serde_json::Value>>) -> ResultSet {
    ResultSet::new(
        columns
            .iter()
            .map(|(name, type_name)| ColumnMeta { name: name.to_string(), type_name: type_name.to_string() })
            .collect(),
        rows,
    )
}
