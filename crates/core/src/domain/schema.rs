use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Names a configured target database. The implicit target is `default`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionRef(pub String);

impl ConnectionRef {
    pub const DEFAULT: &'static str = "default";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionRef {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl std::fmt::Display for ConnectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// Tables, columns and a few sample rows of a target database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableInfo>,
    /// Sample rows keyed by table name.
    pub samples: BTreeMap<String, Vec<Map<String, Value>>>,
}

impl SchemaDescription {
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|table| table.name.eq_ignore_ascii_case(name))
    }

    pub fn identifiers(&self) -> KnownIdentifiers {
        let mut known = KnownIdentifiers::default();
        for table in &self.tables {
            known.tables.push(table.name.clone());
            for column in &table.columns {
                if !known.columns.iter().any(|existing| existing == &column.name) {
                    known.columns.push(column.name.clone());
                }
            }
        }
        known
    }

    /// Schema rendered as the JSON document embedded in generation prompts.
    pub fn to_prompt_json(&self) -> String {
        let tables = self
            .tables
            .iter()
            .map(|table| {
                let columns = table
                    .columns
                    .iter()
                    .map(|column| {
                        json!({
                            "name": column.name,
                            "type": column.data_type,
                            "nullable": column.nullable,
                        })
                    })
                    .collect::<Vec<_>>();
                let foreign_keys = table
                    .foreign_keys
                    .iter()
                    .map(|fk| {
                        json!({
                            "column": fk.column,
                            "references": format!("{}.{}", fk.references_table, fk.references_column),
                        })
                    })
                    .collect::<Vec<_>>();
                (
                    table.name.clone(),
                    json!({
                        "columns": columns,
                        "primary_keys": table.primary_keys,
                        "foreign_keys": foreign_keys,
                    }),
                )
            })
            .collect::<Map<String, Value>>();

        serde_json::to_string_pretty(&Value::Object(tables)).unwrap_or_default()
    }

    /// Sample rows rendered per table, each table capped at `max_chars_per_table`.
    pub fn samples_for_prompt(&self, max_chars_per_table: usize) -> String {
        let mut rendered = String::new();
        for (table, rows) in &self.samples {
            let body = serde_json::to_string(rows).unwrap_or_default();
            let body: String = if body.chars().count() > max_chars_per_table {
                let mut cut: String = body.chars().take(max_chars_per_table).collect();
                cut.push_str("...");
                cut
            } else {
                body
            };
            rendered.push_str(table);
            rendered.push_str(": ");
            rendered.push_str(&body);
            rendered.push('\n');
        }
        rendered
    }
}

/// Identifier catalogue the heuristic repairer corrects against.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownIdentifiers {
    pub tables: Vec<String>,
    pub columns: Vec<String>,
}

impl KnownIdentifiers {
    pub fn new<T, C>(tables: T, columns: C) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.tables.iter().chain(self.columns.iter()).any(|known| known.eq_ignore_ascii_case(word))
    }
}
