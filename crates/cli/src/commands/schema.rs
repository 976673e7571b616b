use serde_json::json;
use textsql_core::domain::schema::{ConnectionRef, SchemaDescription};
use textsql_core::ports::SchemaDescriptor;
use textsql_db::{SqliteSchemaDescriptor, TargetRegistry};

use crate::commands::{load_config, runtime, CommandResult};

/// Introspects the configured target database.
pub fn run() -> CommandResult {
    let config = match load_config("schema") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("schema") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let targets = TargetRegistry::from_config(&config.target)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        SqliteSchemaDescriptor::new(targets, config.pipeline.schema_sample_rows)
            .describe(&ConnectionRef::default())
            .await
            .map_err(|error| ("introspection", error.to_string(), 4u8))
    });

    match result {
        Ok(description) => CommandResult::success_with_data(
            "schema",
            render_tables(&description),
            Some(json!({ "tables": description.tables, "samples": description.samples })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("schema", error_class, message, exit_code)
        }
    }
}

/// One line per table: `name(col type, ...)`, primary keys marked with `*`.
pub fn render_tables(description: &SchemaDescription) -> String {
    if description.tables.is_empty() {
        return "target database has no user tables".to_string();
    }
    description
        .tables
        .iter()
        .map(|table| {
            let columns = table
                .columns
                .iter()
                .map(|column| {
                    let marker = if table.primary_keys.contains(&column.name) { "*" } else { "" };
                    format!("{}{marker} {}", column.name, column.data_type)
                })
                .collect::<Vec<_>>();
            format!("{}({})", table.name, columns.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
