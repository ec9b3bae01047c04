use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::result::ResultSet;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Trace {
    pub name: Option<String>,
    /// 饼图时为 labels
    pub x: Vec<Value>,
    /// 饼图时为 values
    pub y: Vec<Value>,
}

/// 图表描述，由前端负责渲染
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Figure {
    pub kind: ChartKind,
    pub title: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub traces: Vec<Trace>,
}

/// 可视化代码的唯一输出
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum VisualOutput {
    Figure(Figure),
    Table(ResultSet),
    Scalar(String),
}

impl VisualOutput {
    pub fn arm(&self) -> &'static str {
        match self {
            VisualOutput::Figure(_) => "figure",
            VisualOutput::Table(_) => "table",
            VisualOutput::Scalar(_) => "scalar",
        }
    }
}

/// 可视化修复循环的产物；`output` 为 None 表示预算耗尽
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct VisualizationArtifact {
    pub output: Option<VisualOutput>,
    pub code: String,
    pub retries: u32,
    pub last_error: String,
}

impl VisualizationArtifact {
    pub fn figure(&self) -> Option<&Figure> {
        match &self.output {
            Some(VisualOutput::Figure(f)) => Some(f),
            _ => None,
        }
    }

    pub fn table(&self) -> Option<&ResultSet> {
        match &self.output {
            Some(VisualOutput::Table(t)) => Some(t),
            _ => None,
        }
    }

    pub fn scalar(&self) -> Option<&str> {
        match &self.output {
            Some(VisualOutput::Scalar(s)) => Some(s),
            _ => None,
        }
    }

    pub fn populated_arms(&self) -> usize {
        [self.figure().is_some(), self.table().is_some(), self.scalar().is_some()]
            .iter()
            .filter(|x| **x)
            .count()
    }
}
