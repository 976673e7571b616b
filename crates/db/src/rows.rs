//! Dynamic decoding of SQLite rows into JSON values.

use serde_json::{Map, Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// Decodes every column of `row` by its runtime storage class. Blobs become
/// lowercase hex strings.
pub fn decode_row(row: &SqliteRow) -> Result<Vec<Value>, sqlx::Error> {
    (0..row.columns().len()).map(|index| decode_cell(row, index)).collect()
}

pub fn decode_record(row: &SqliteRow) -> Result<Map<String, Value>, sqlx::Error> {
    let values = decode_row(row)?;
    Ok(column_names(row).into_iter().zip(values).collect())
}

pub fn column_names(row: &SqliteRow) -> Vec<String> {
    row.columns().iter().map(|column| column.name().to_string()).collect()
}

fn decode_cell(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_ascii_uppercase();

    let value = match storage.as_str() {
        "INTEGER" | "INT8" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" | "NUMERIC" => Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => Value::String(hex(&row.try_get_unchecked::<Vec<u8>, _>(index)?)),
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{decode_record, decode_row};
    use crate::connect_with_settings;

    #[tokio::test]
    async fn storage_classes_map_to_json() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");

        let row = sqlx::query("SELECT 42 AS n, 2.5 AS r, 'CS' AS t, x'0aff' AS b, NULL AS z")
            .fetch_one(&pool)
            .await
            .expect("row");

        assert_eq!(
            decode_row(&row).expect("decode"),
            vec![json!(42), json!(2.5), json!("CS"), json!("0aff"), json!(null)]
        );
        assert_eq!(decode_record(&row).expect("record")["t"], json!("CS"));
    }
}
