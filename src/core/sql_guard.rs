//! 只读安全闸门与行数上限包装。

use regex::Regex;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardViolation {
    #[error("only SELECT statements are allowed, got `{0}`")]
    NotReadOnly(String),
    #[error("multiple statements are not allowed")]
    MultipleStatements,
    #[error("statement writes or locks data ({0})")]
    WritesData(&'static str),
}

fn select_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)^\s*select\b").unwrap())
}

fn write_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)\binto\b|\bfor\s+(?:no\s+key\s+)?(?:key\s+)?(?:update|share)\b").unwrap())
}

fn trailing_limit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\blimit\s+(?:\d+\s*,\s*)?(\d+)(?:\s+offset\s+\d+)?\s*$").unwrap()
    })
}

fn tokenize(sql: &str) -> Option<Vec<Token>> {
    Tokenizer::new(&GenericDialect {}, sql)
        .with_unescape(false)
        .tokenize()
        .ok()
}

fn is_insignificant(t: &Token) -> bool {
    matches!(t, Token::Whitespace(_) | Token::EOF)
}

/// 只读判定：
/// 1. 首个关键字必须是 SELECT，且只能有一条语句；
/// 2. 不允许 SELECT ... INTO（建表/导出文件）以及 FOR UPDATE / FOR SHARE 行锁。
///
/// 能解析成语法树时按语法树判定第 2 条，否则按词法/正则兜底。
pub fn ensure_read_only(sql: &str) -> Result<(), GuardViolation> {
    let Some(tokens) = tokenize(sql) else {
        // 词法失败（如引号未闭合）交给执行阶段报错并修复，这里只做前缀与关键字判定
        if !select_prefix_regex().is_match(sql) {
            return Err(GuardViolation::NotReadOnly(first_word(sql)));
        }
        if write_marker_regex().is_match(sql) {
            return Err(GuardViolation::WritesData("INTO or row lock"));
        }
        return Ok(());
    };

    let significant: Vec<&Token> = tokens.iter().filter(|t| !is_insignificant(t)).collect();

    match significant.first() {
        Some(Token::Word(w)) if w.keyword == Keyword::SELECT => {}
        Some(other) => return Err(GuardViolation::NotReadOnly(other.to_string())),
        None => return Err(GuardViolation::NotReadOnly(String::new())),
    }

    let mut after_semicolon = false;
    for tok in &significant {
        match tok {
            Token::SemiColon => after_semicolon = true,
            _ if after_semicolon => return Err(GuardViolation::MultipleStatements),
            _ => {}
        }
    }

    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => {
            for statement in &statements {
                match statement {
                    Statement::Query(q) => {
                        if let Some(what) = query_writes(q) {
                            return Err(GuardViolation::WritesData(what));
                        }
                    }
                    other => return Err(GuardViolation::NotReadOnly(first_word(&other.to_string()))),
                }
            }
            Ok(())
        }
        // 方言差异导致解析失败时（如 MySQL 的 INTO OUTFILE），按关键字序列判定
        Err(_) => match token_writes(&significant) {
            Some(what) => Err(GuardViolation::WritesData(what)),
            None => Ok(()),
        },
    }
}

fn query_writes(q: &Query) -> Option<&'static str> {
    if !q.locks.is_empty() {
        return Some("FOR UPDATE/SHARE");
    }
    set_expr_writes(&q.body)
}

fn set_expr_writes(body: &SetExpr) -> Option<&'static str> {
    match body {
        SetExpr::Select(select) if select.into.is_some() => Some("SELECT INTO"),
        SetExpr::Query(q) => query_writes(q),
        SetExpr::SetOperation { left, right, .. } => set_expr_writes(left).or_else(|| set_expr_writes(right)),
        SetExpr::Insert(_) | SetExpr::Update(_) => Some("data modification"),
        _ => None,
    }
}

fn token_writes(significant: &[&Token]) -> Option<&'static str> {
    let keyword = |t: &Token| match t {
        Token::Word(w) => Some(w.keyword),
        _ => None,
    };
    for (i, tok) in significant.iter().enumerate() {
        match keyword(*tok) {
            Some(Keyword::INTO) => return Some("SELECT INTO"),
            Some(Keyword::FOR) => {
                let next = significant.get(i + 1).and_then(|t| keyword(*t));
                if matches!(next, Some(Keyword::UPDATE | Keyword::SHARE | Keyword::NO | Keyword::KEY)) {
                    return Some("FOR UPDATE/SHARE");
                }
            }
            _ => {}
        }
    }
    None
}

fn first_word(sql: &str) -> String {
    sql.split_whitespace().next().unwrap_or_default().to_string()
}

/// 去掉末尾的分号、空白与注释；词法失败时退回按字符裁剪
fn statement_body(sql: &str) -> String {
    let Some(tokens) = tokenize(sql) else {
        return sql.trim().trim_end_matches(';').trim_end().to_string();
    };
    let end = tokens
        .iter()
        .rposition(|t| !is_insignificant(t) && *t != Token::SemiColon)
        .map_or(0, |i| i + 1);
    tokens[..end].iter().map(Token::to_string).collect::<String>().trim().to_string()
}

/// 末尾已有 LIMIT 时返回其行数
pub fn trailing_limit(sql: &str) -> Option<u64> {
    trailing_limit_regex()
        .captures(&statement_body(sql))
        .and_then(|cap| cap[1].parse().ok())
}

/// 没有上限（或上限超过 ceiling）时包一层 LIMIT；
/// 已经在上限以内的语句原样执行（仅去掉末尾分号与注释）
pub fn wrap_with_limit(sql: &str, ceiling: u64) -> String {
    let body = statement_body(sql);
    match trailing_limit(&body) {
        Some(cap) if cap <= ceiling => body,
        _ => format!("SELECT * FROM (\n{}\n) AS t LIMIT {}", body, ceiling),
    }
}
