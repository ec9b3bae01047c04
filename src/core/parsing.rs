//! 模型输出的防御式解析。
//!
//! 所有函数都不会 panic 也不会返回错误：解析失败统一返回 `None`，
//! 由调用方决定空值时的默认行为。

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn nested_list_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[\s*\[.*?\]\s*(,\s*\[.*?\]\s*)*\]").unwrap())
}

fn object_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap())
}

/// 解析期望为 (嵌套) 列表的输出。
/// 依次尝试：JSON -> 单引号字面量转 JSON -> 文本中第一个 `[[...], ...]` 片段。
pub fn parse_nested_list(text: &str) -> Option<Vec<Value>> {
    let s = strip_fence(text.trim());
    if s.is_empty() {
        return None;
    }
    if let Some(list) = list_from_literal(s) {
        return Some(list);
    }
    let m = nested_list_regex().find(s)?;
    list_from_literal(m.as_str())
}

fn list_from_literal(s: &str) -> Option<Vec<Value>> {
    let parsed = serde_json::from_str::<Value>(s)
        .ok()
        .or_else(|| serde_json::from_str::<Value>(&single_to_double_quotes(s)).ok())?;
    match parsed {
        Value::Array(list) => Some(list),
        _ => None,
    }
}

/// 解析期望为 JSON 对象的输出：整段文本，或第一个 `{...}` 片段
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let s = strip_fence(text.trim());
    let parsed = serde_json::from_str::<Value>(s).ok().or_else(|| {
        let m = object_regex().find(s)?;
        serde_json::from_str::<Value>(m.as_str()).ok()
    })?;
    match parsed {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// 把 Python 风格的单引号字符串字面量改写成 JSON 双引号字面量
fn single_to_double_quotes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push('"');
                while let Some(d) = chars.next() {
                    out.push(d);
                    if d == '\\' {
                        if let Some(e) = chars.next() {
                            out.push(e);
                        }
                    } else if d == '"' {
                        break;
                    }
                }
            }
            '\'' => {
                out.push('"');
                while let Some(d) = chars.next() {
                    match d {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(e) => {
                                out.push('\\');
                                out.push(e);
                            }
                            None => {}
                        },
                        '\'' => break,
                        '"' => out.push_str("\\\""),
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            other => out.push(other),
        }
    }
    out
}

/// 去掉包裹整段文本的代码围栏（若存在）
fn strip_fence(s: &str) -> &str {
    if !s.starts_with("```") {
        return s;
    }
    let body = &s[3..];
    let body = match body.find('\n') {
        Some(nl) if !body[..nl].trim().contains(' ') => &body[nl + 1..],
        _ => body,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// 提取 SQL：只剥离代码围栏，不在任意文本里搜索 SELECT
pub fn extract_sql(text: &str) -> String {
    match fenced_block(text, Some("sql")).or_else(|| fenced_block(text, None)) {
        Some(inner) => inner,
        None => text.trim().to_string(),
    }
}

/// 提取可视化代码：```lua 围栏 -> 任意围栏 -> 去掉残留反引号的原文
pub fn extract_code_block(text: &str, language: &str) -> String {
    if let Some(inner) = fenced_block(text, Some(language)).or_else(|| fenced_block(text, None)) {
        return inner;
    }
    text.replace("```", "").trim().to_string()
}

fn fenced_block(text: &str, language: Option<&str>) -> Option<String> {
    let pattern = match language {
        Some(lang) => format!(r"(?is)```\s*{}\s*\n?(.*?)```", regex::escape(lang)),
        None => r"(?s)```[A-Za-z0-9_-]*\s*\n?(.*?)```".to_string(),
    };
    let re = Regex::new(&pattern).ok()?;
    re.captures(text).map(|cap| cap[1].trim().to_string())
}

/// 按字符边界截断
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// 值转为去空白文本；字符串不带引号
pub fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
