//! 可视化代码沙箱。
//!
//! 生成的代码是 Lua，每次执行都新建一个解释器，只加载 table/string/math/utf8，
//! 可见的绑定只有结果集 `df` 与绘图库 `viz`。代码必须且只能给
//! `fig`、`df_viz`、`string_viz_result` 其中之一赋值。
//! 结果集为空时只接受 `string_viz_result`。

use mlua::{HookTriggers, LightUserData, Lua, LuaOptions, StdLib, Table, Value, VmState};
use serde_json::{json, Map, Value as Json};
use std::cell::Cell;
use thiserror::Error;

use crate::models::result::{ColumnMeta, ResultSet};
use crate::models::visual::{Figure, VisualOutput};

const PRELUDE: &str = include_str!("viz_prelude.lua");

pub const OUTPUT_NAMES: [&str; 3] = ["fig", "df_viz", "string_viz_result"];

/// 基础库中需要移除的全局函数
const BLOCKED_GLOBALS: [&str; 6] = ["dofile", "loadfile", "load", "loadstring", "collectgarbage", "print"];

const MAX_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum SandboxFault {
    #[error("lua error: {0}")]
    Lua(String),

    #[error("no output assigned: set exactly one of fig, df_viz, string_viz_result")]
    NoOutput,

    #[error("more than one output assigned ({0}); set exactly one of fig, df_viz, string_viz_result")]
    MultipleOutputs(String),

    #[error("the result set is empty: set string_viz_result to a message saying there is no data instead of assigning {0}")]
    OutputOnEmptyResult(&'static str),

    #[error("malformed {name}: {message}")]
    Malformed { name: &'static str, message: String },
}

impl From<mlua::Error> for SandboxFault {
    fn from(e: mlua::Error) -> Self {
        SandboxFault::Lua(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    /// 以千条指令为单位
    pub instruction_budget: u64,
    pub memory_limit: usize,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self {
            instruction_budget: 5_000,
            memory_limit: 64 * 1024 * 1024,
        }
    }
}

impl Sandbox {
    pub fn run(&self, code: &str, data: &ResultSet) -> Result<VisualOutput, SandboxFault> {
        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
            LuaOptions::new(),
        )?;
        lua.set_memory_limit(self.memory_limit)?;

        let budget = self.instruction_budget;
        let ticks = Cell::new(0u64);
        let _ = lua.set_hook(
            HookTriggers::new().every_nth_instruction(1000),
            move |_lua, _debug| {
                ticks.set(ticks.get() + 1);
                if ticks.get() > budget {
                    return Err(mlua::Error::runtime("instruction budget exceeded"));
                }
                Ok(VmState::Continue)
            },
        );

        let globals = lua.globals();
        for name in BLOCKED_GLOBALS {
            globals.set(name, Value::Nil)?;
        }
        lua.load(PRELUDE).set_name("viz_prelude").exec()?;
        let viz: Table = globals.get("viz")?;
        viz.set("null", null_sentinel())?;
        globals.set("df", build_frame(&lua, data)?)?;

        lua.load(code).set_name("visualization").exec()?;

        let mut assigned = Vec::new();
        for name in OUTPUT_NAMES {
            let v: Value = globals.get(name)?;
            if !v.is_nil() {
                assigned.push((name, v));
            }
        }
        if assigned.len() > 1 {
            let names: Vec<&str> = assigned.iter().map(|(n, _)| *n).collect();
            return Err(SandboxFault::MultipleOutputs(names.join(", ")));
        }
        let (name, value) = assigned.pop().ok_or(SandboxFault::NoOutput)?;

        if data.is_empty() && name != "string_viz_result" {
            return Err(SandboxFault::OutputOnEmptyResult(name));
        }
        match name {
            "fig" => to_figure(&value).map(VisualOutput::Figure),
            "df_viz" => to_table(&value, data).map(VisualOutput::Table),
            _ => to_scalar(&value).map(VisualOutput::Scalar),
        }
    }
}

/// SQL NULL 在 Lua 侧的占位值，`viz.column` 用它填补空洞
fn null_sentinel() -> Value {
    Value::LightUserData(LightUserData(std::ptr::null_mut()))
}

fn build_frame(lua: &Lua, data: &ResultSet) -> mlua::Result<Table> {
    let frame = lua.create_table()?;
    let columns = lua.create_table()?;
    for (i, name) in data.column_names().into_iter().enumerate() {
        columns.set(i + 1, name)?;
    }
    let rows = lua.create_table()?;
    for (r, row) in data.rows.iter().enumerate() {
        let t = lua.create_table()?;
        for (c, v) in data.columns.iter().zip(row.iter()) {
            t.set(c.name.as_str(), json_to_lua(lua, v)?)?;
        }
        rows.set(r + 1, t)?;
    }
    frame.set("columns", columns)?;
    frame.set("rows", rows)?;
    frame.set("n", data.rows.len())?;
    Ok(frame)
}

fn json_to_lua(lua: &Lua, v: &Json) -> mlua::Result<Value> {
    Ok(match v {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::String(lua.create_string(s)?),
        Json::Array(items) => {
            let t = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                t.set(i + 1, json_to_lua(lua, item)?)?;
            }
            Value::Table(t)
        }
        Json::Object(map) => {
            let t = lua.create_table()?;
            for (k, item) in map {
                t.set(k.as_str(), json_to_lua(lua, item)?)?;
            }
            Value::Table(t)
        }
    })
}

/// Lua 值转 JSON。键全是正整数且不太稀疏的表视为数组（空洞补 null），空表视为空数组。
fn lua_to_json(v: &Value, depth: usize) -> Result<Json, String> {
    if depth > MAX_DEPTH {
        return Err("value is nested too deeply".to_string());
    }
    Ok(match v {
        Value::Nil => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => json!(*i),
        Value::Number(n) => serde_json::Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.to_string_lossy().to_string()),
        Value::LightUserData(ud) if ud.0.is_null() => Json::Null,
        Value::Table(t) => {
            let mut entries = Vec::new();
            for pair in t.clone().pairs::<Value, Value>() {
                entries.push(pair.map_err(|e| e.to_string())?);
            }
            let max_index = entries.iter().try_fold(0usize, |max, (k, _)| match k {
                Value::Integer(i) if *i >= 1 => Some(max.max(*i as usize)),
                _ => None,
            });
            let len = match max_index {
                Some(max) if max <= entries.len() * 2 => Some(max),
                _ => None,
            };
            if let Some(len) = len {
                let mut items = vec![Json::Null; len];
                for (k, item) in &entries {
                    if let Value::Integer(i) = k {
                        items[*i as usize - 1] = lua_to_json(item, depth + 1)?;
                    }
                }
                Json::Array(items)
            } else {
                let mut map = Map::new();
                for (k, item) in &entries {
                    let key = match k {
                        Value::String(s) => s.to_string_lossy().to_string(),
                        Value::Integer(i) => i.to_string(),
                        Value::Number(n) => n.to_string(),
                        other => return Err(format!("unsupported table key of type {}", other.type_name())),
                    };
                    map.insert(key, lua_to_json(item, depth + 1)?);
                }
                Json::Object(map)
            }
        }
        other => return Err(format!("unsupported value of type {}", other.type_name())),
    })
}

fn to_figure(v: &Value) -> Result<Figure, SandboxFault> {
    let malformed = |message: String| SandboxFault::Malformed { name: "fig", message };
    let json = lua_to_json(v, 0).map_err(malformed)?;
    if json.get("__figure") != Some(&Json::Bool(true)) {
        return Err(malformed(
            "fig must be built with viz.bar, viz.line, viz.scatter or viz.pie".to_string(),
        ));
    }
    let figure: Figure = serde_json::from_value(json).map_err(|e| malformed(e.to_string()))?;
    for (i, trace) in figure.traces.iter().enumerate() {
        if !trace.x.is_empty() && trace.x.len() != trace.y.len() {
            return Err(malformed(format!(
                "trace {} has {} x values but {} y values",
                i + 1,
                trace.x.len(),
                trace.y.len()
            )));
        }
    }
    Ok(figure)
}

fn to_table(v: &Value, source: &ResultSet) -> Result<ResultSet, SandboxFault> {
    let malformed = |message: String| SandboxFault::Malformed { name: "df_viz", message };
    let json = lua_to_json(v, 0).map_err(malformed)?;
    let names: Vec<String> = match json.get("columns") {
        Some(Json::Array(cols)) => cols
            .iter()
            .map(|c| c.as_str().map(str::to_string))
            .collect::<Option<_>>()
            .ok_or_else(|| malformed("columns must be an array of strings".to_string()))?,
        _ => return Err(malformed("missing columns array (use viz.table or df)".to_string())),
    };
    let raw_rows = match json.get("rows") {
        Some(Json::Array(rows)) => rows.clone(),
        _ => return Err(malformed("missing rows array (use viz.table or df)".to_string())),
    };

    let columns: Vec<ColumnMeta> = names
        .iter()
        .map(|name| ColumnMeta {
            name: name.clone(),
            type_name: source
                .columns
                .iter()
                .find(|c| &c.name == name)
                .map(|c| c.type_name.clone())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
        })
        .collect();

    let mut rows = Vec::with_capacity(raw_rows.len());
    for raw in raw_rows {
        let row = match raw {
            Json::Object(map) => names.iter().map(|n| map.get(n).cloned().unwrap_or(Json::Null)).collect(),
            Json::Array(mut cells) => {
                cells.resize(names.len(), Json::Null);
                cells
            }
            other => return Err(malformed(format!("row must be a table, got {}", other))),
        };
        rows.push(row);
    }
    Ok(ResultSet::new(columns, rows))
}

fn to_scalar(v: &Value) -> Result<String, SandboxFault> {
    let text = match v {
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(SandboxFault::Malformed {
                name: "string_viz_result",
                message: format!("expected a string, got {}", other.type_name()),
            })
        }
    };
    if text.trim().is_empty() {
        return Err(SandboxFault::Malformed {
            name: "string_viz_result",
            message: "string is empty".to_string(),
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::visual::ChartKind;

    fn monthly() -> ResultSet {
        ResultSet::new(
            vec![
                ColumnMeta { name: "month".into(), type_name: "TEXT".into() },
                ColumnMeta { name: "total_sales".into(), type_name: "DOUBLE".into() },
            ],
            vec![
                vec![json!("2017-01"), json!(100.5)],
                vec![json!("2017-02"), json!(250)],
            ],
        )
    }

    #[test]
    fn builds_line_chart_from_columns() {
        let code = r#"
            fig = viz.line{
                x = viz.column(df, "month"),
                y = viz.column(df, "total_sales"),
                title = "Monthly sales",
                x_label = "month",
            }
        "#;
        let out = Sandbox::default().run(code, &monthly()).unwrap();
        let VisualOutput::Figure(fig) = out else { panic!("expected figure") };
        assert_eq!(fig.kind, ChartKind::Line);
        assert_eq!(fig.title.as_deref(), Some("Monthly sales"));
        assert_eq!(fig.traces.len(), 1);
        assert_eq!(fig.traces[0].x, vec![json!("2017-01"), json!("2017-02")]);
        assert_eq!(fig.traces[0].y, vec![json!(100.5), json!(250)]);
    }

    #[test]
    fn df_passthrough_becomes_table() {
        let out = Sandbox::default().run("df_viz = df", &monthly()).unwrap();
        let VisualOutput::Table(t) = out else { panic!("expected table") };
        assert_eq!(t, monthly());
    }

    #[test]
    fn scalar_from_first_row() {
        let code = r#"string_viz_result = "Months: " .. df.n"#;
        let out = Sandbox::default().run(code, &monthly()).unwrap();
        assert_eq!(out, VisualOutput::Scalar("Months: 2".into()));
    }

    #[test]
    fn missing_output_is_a_fault() {
        let err = Sandbox::default().run("local x = 1", &monthly()).unwrap_err();
        assert!(matches!(err, SandboxFault::NoOutput));
    }

    #[test]
    fn two_outputs_are_a_fault() {
        let err = Sandbox::default()
            .run("df_viz = df\nstring_viz_result = 'x'", &monthly())
            .unwrap_err();
        assert!(matches!(err, SandboxFault::MultipleOutputs(_)));
    }

    #[test]
    fn chart_on_empty_result_is_a_fault() {
        let empty = ResultSet::new(monthly().columns, vec![]);
        let err = Sandbox::default()
            .run("fig = viz.bar{ x = {}, y = {} }", &empty)
            .unwrap_err();
        assert!(matches!(err, SandboxFault::OutputOnEmptyResult("fig")));
    }

    #[test]
    fn table_on_empty_result_is_a_fault() {
        let empty = ResultSet::new(monthly().columns, vec![]);
        let err = Sandbox::default().run("df_viz = df", &empty).unwrap_err();
        assert!(matches!(err, SandboxFault::OutputOnEmptyResult("df_viz")));
        assert!(err.to_string().contains("result set is empty"));

        let err = Sandbox::default().run("df_viz = df", &ResultSet::default()).unwrap_err();
        assert!(matches!(err, SandboxFault::OutputOnEmptyResult("df_viz")));
    }

    #[test]
    fn message_on_empty_result_is_accepted() {
        let empty = ResultSet::new(monthly().columns, vec![]);
        let out = Sandbox::default()
            .run("string_viz_result = 'No orders matched the question.'", &empty)
            .unwrap();
        assert_eq!(out, VisualOutput::Scalar("No orders matched the question.".into()));
    }

    fn with_revenue(values: &[Json]) -> ResultSet {
        ResultSet::new(
            vec![
                ColumnMeta { name: "month".into(), type_name: "TEXT".into() },
                ColumnMeta { name: "revenue".into(), type_name: "DOUBLE".into() },
            ],
            values
                .iter()
                .enumerate()
                .map(|(i, v)| vec![json!(format!("2017-0{}", i + 1)), v.clone()])
                .collect(),
        )
    }

    const REVENUE_CHART: &str = r#"
        fig = viz.bar{ x = viz.column(df, "month"), y = viz.column(df, "revenue") }
    "#;

    #[test]
    fn null_cells_keep_their_position_in_columns() {
        let data = with_revenue(&[json!(1.0), Json::Null, json!(3.0), Json::Null]);
        let out = Sandbox::default().run(REVENUE_CHART, &data).unwrap();
        let VisualOutput::Figure(fig) = out else { panic!("expected figure") };
        assert_eq!(fig.traces[0].x.len(), 4);
        assert_eq!(fig.traces[0].y, vec![json!(1.0), Json::Null, json!(3.0), Json::Null]);
    }

    #[test]
    fn trailing_null_does_not_shorten_the_trace() {
        let data = with_revenue(&[json!(1.0), Json::Null]);
        let out = Sandbox::default().run(REVENUE_CHART, &data).unwrap();
        let VisualOutput::Figure(fig) = out else { panic!("expected figure") };
        assert_eq!(fig.traces[0].x, vec![json!("2017-01"), json!("2017-02")]);
        assert_eq!(fig.traces[0].y, vec![json!(1.0), Json::Null]);
    }

    #[test]
    fn null_sentinel_can_be_tested_in_lua() {
        let data = with_revenue(&[json!(1.0), Json::Null, json!(3.0)]);
        let code = r#"
            local total = 0
            for _, v in ipairs(viz.column(df, "revenue")) do
              if v ~= viz.null then total = total + v end
            end
            string_viz_result = "total " .. total
        "#;
        let out = Sandbox::default().run(code, &data).unwrap();
        assert_eq!(out, VisualOutput::Scalar("total 4.0".into()));
    }

    #[test]
    fn mismatched_trace_lengths_are_rejected() {
        let err = Sandbox::default()
            .run("fig = viz.line{ x = {'a', 'b', 'c'}, y = {1, 2} }", &monthly())
            .unwrap_err();
        let SandboxFault::Malformed { name: "fig", message } = err else { panic!("expected malformed fig") };
        assert!(message.contains("3 x values but 2 y values"));
    }

    #[test]
    fn io_and_loaders_are_not_bound() {
        for code in [
            "io.open('/etc/passwd')",
            "os.execute('ls')",
            "require('socket')",
            "load('return 1')()",
            "dofile('/tmp/x.lua')",
        ] {
            let err = Sandbox::default().run(code, &monthly()).unwrap_err();
            assert!(matches!(err, SandboxFault::Lua(_)), "{code}");
        }
    }

    #[test]
    fn runaway_loop_hits_instruction_budget() {
        let sandbox = Sandbox { instruction_budget: 10, ..Sandbox::default() };
        let err = sandbox.run("while true do end", &monthly()).unwrap_err();
        let SandboxFault::Lua(msg) = err else { panic!("expected lua fault") };
        assert!(msg.contains("instruction budget exceeded"));
    }

    #[test]
    fn runtime_error_is_reported() {
        let err = Sandbox::default()
            .run("fig = viz.bar{ x = df.missing.values }", &monthly())
            .unwrap_err();
        assert!(matches!(err, SandboxFault::Lua(_)));
    }

    #[test]
    fn hand_built_fig_is_rejected() {
        let err = Sandbox::default()
            .run("fig = { kind = 'bar' }", &monthly())
            .unwrap_err();
        assert!(matches!(err, SandboxFault::Malformed { name: "fig", .. }));
    }
}
