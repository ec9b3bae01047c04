use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// 单表知识条目：表描述 + 按顺序排列的 (列名, 列描述)
///
/// 序列化形状沿用离线构建产物：`["表描述", [["列名", "描述"], ...]]`
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct TableKnowledge(pub String, pub Vec<(String, String)>);

impl TableKnowledge {
    pub fn new(description: impl Into<String>, columns: Vec<(String, String)>) -> Self {
        Self(description.into(), columns)
    }

    pub fn description(&self) -> &str {
        &self.0
    }

    pub fn columns(&self) -> &[(String, String)] {
        &self.1
    }
}

/// 表名 -> 表知识。运行期只读，启动时加载一次。
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(transparent)]
pub struct KnowledgeBase {
    tables: BTreeMap<String, TableKnowledge>,
}

impl KnowledgeBase {
    pub fn from_tables(tables: impl IntoIterator<Item = (String, TableKnowledge)>) -> Self {
        Self {
            tables: tables.into_iter().collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("读取知识库失败 {}: {}", path.display(), e))?;
        let kb: Self = serde_json::from_str(&raw)?;
        if kb.is_empty() {
            anyhow::bail!("知识库为空: {}", path.display());
        }
        Ok(kb)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn get(&self, table: &str) -> Option<&TableKnowledge> {
        self.tables.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TableKnowledge)> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
