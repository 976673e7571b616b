use crate::commands::{load_config, runtime, CommandResult};
use textsql_db::{connect_target, TableSeedInfo, UniversityDataset};

/// Loads the demo university dataset into the configured target database.
/// The target is opened writable for this command only.
pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_target(
            &config.target.url,
            config.target.max_connections,
            config.target.timeout_secs,
            false,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let seed_result = UniversityDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = UniversityDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result = if verification.all_present {
            Ok(seed_result.tables_seeded)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(tables) => CommandResult::success("seed", seed_message(&config.target.url, &tables)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn seed_message(target_url: &str, tables: &[TableSeedInfo]) -> String {
    let lines = tables
        .iter()
        .map(|table| format!("  - {}: {} rows ({})", table.table, table.rows, table.description))
        .collect::<Vec<_>>();
    format!("university demo dataset loaded into `{target_url}`:\n{}", lines.join("\n"))
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use textsql_db::TableSeedInfo;

    use super::{seed_message, verification_message};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let message = verification_message(&["students", "enrollment-references"]);

        assert_eq!(message, "Seed verification failed for checks: students, enrollment-references");
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }

    #[test]
    fn seed_message_lists_every_table() {
        let tables = vec![
            TableSeedInfo { table: "departments", rows: 4, description: "academic departments" },
            TableSeedInfo { table: "students", rows: 12, description: "enrolled students" },
        ];

        let message = seed_message("sqlite://demo.db", &tables);

        assert!(message.starts_with("university demo dataset loaded into `sqlite://demo.db`"));
        assert!(message.contains("  - students: 12 rows (enrolled students)"));
    }
}
