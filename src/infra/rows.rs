use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};

use crate::models::result::ColumnMeta;

pub fn column_metas<C: Column>(columns: &[C]) -> Vec<ColumnMeta> {
    columns
        .iter()
        .map(|c| ColumnMeta {
            name: c.name().to_string(),
            type_name: c.type_info().name().to_string(), // 数据库原生类型名，如 "INT4", "NUMERIC"
        })
        .collect()
}

// 按列位置取值，避免重名列（如 JOIN 后的两个 id）互相覆盖
pub fn pg_row_values(row: &PgRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| match col.type_info().name() {
            "INT2" => json!(row.try_get::<Option<i16>, _>(i).unwrap_or(None)),
            "INT4" => json!(row.try_get::<Option<i32>, _>(i).unwrap_or(None)),
            "INT8" => json!(row.try_get::<Option<i64>, _>(i).unwrap_or(None)),
            "FLOAT4" => json!(row.try_get::<Option<f32>, _>(i).unwrap_or(None)),
            "FLOAT8" => json!(row.try_get::<Option<f64>, _>(i).unwrap_or(None)),
            "NUMERIC" => {
                let v: Option<rust_decimal::Decimal> = row.try_get(i).unwrap_or(None);
                // 金额转为 f64 便于绘图
                json!(v.map(|d| d.to_f64().unwrap_or(0.0)))
            }
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => json!(row.try_get::<Option<String>, _>(i).unwrap_or(None)),
            "BOOL" => json!(row.try_get::<Option<bool>, _>(i).unwrap_or(None)),
            "DATE" => json!(row.try_get::<Option<NaiveDate>, _>(i).unwrap_or(None).map(|d| d.to_string())),
            "TIMESTAMP" => json!(row
                .try_get::<Option<NaiveDateTime>, _>(i)
                .unwrap_or(None)
                .map(|dt| dt.to_string())),
            "TIMESTAMPTZ" => json!(row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
                .unwrap_or(None)
                .map(|dt| dt.to_rfc3339())),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i).unwrap_or(None).unwrap_or(Value::Null),
            // 对于未知类型，尝试转为字符串
            _ => json!(row.try_get::<Option<String>, _>(i).unwrap_or(None)),
        })
        .collect()
}

pub fn mysql_row_values(row: &MySqlRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| match col.type_info().name() {
            "TINYINT" | "SMALLINT" | "INT" | "MEDIUMINT" => {
                json!(row.try_get::<Option<i32>, _>(i).unwrap_or(None))
            }
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => {
                json!(row.try_get::<Option<u32>, _>(i).unwrap_or(None))
            }
            "BIGINT" => json!(row.try_get::<Option<i64>, _>(i).unwrap_or(None)),
            "BIGINT UNSIGNED" => json!(row.try_get::<Option<u64>, _>(i).unwrap_or(None)),
            "FLOAT" => json!(row.try_get::<Option<f32>, _>(i).unwrap_or(None)),
            "DOUBLE" => json!(row.try_get::<Option<f64>, _>(i).unwrap_or(None)),
            "DECIMAL" | "NEWDECIMAL" => {
                let v: Option<rust_decimal::Decimal> = row.try_get(i).unwrap_or(None);
                json!(v.map(|d| d.to_f64().unwrap_or(0.0)))
            }
            "DATE" => json!(row.try_get::<Option<NaiveDate>, _>(i).unwrap_or(None).map(|d| d.to_string())),
            "DATETIME" | "TIMESTAMP" => json!(row
                .try_get::<Option<NaiveDateTime>, _>(i)
                .unwrap_or(None)
                .map(|dt| dt.to_string())),
            "BOOLEAN" => json!(row.try_get::<Option<bool>, _>(i).unwrap_or(None)),
            "JSON" => row.try_get::<Option<Value>, _>(i).unwrap_or(None).unwrap_or(Value::Null),
            _ => json!(row.try_get::<Option<String>, _>(i).unwrap_or(None)),
        })
        .collect()
}
