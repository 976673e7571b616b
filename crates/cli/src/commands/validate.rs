use serde::Serialize;
use textsql_agent::guardrails::ReadOnlyPolicy;
use textsql_core::domain::schema::{ConnectionRef, KnownIdentifiers};
use textsql_core::domain::verdict::ValidationVerdict;
use textsql_core::ports::SchemaDescriptor;
use textsql_core::sql::repair::{Correction, HeuristicRepairer};
use textsql_db::{SqliteSchemaDescriptor, TargetRegistry};

use crate::commands::{load_config, runtime, CommandResult};

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub original: String,
    pub repaired: String,
    pub corrections: Vec<Correction>,
    pub verdict: ValidationVerdict,
}

/// Runs the heuristic repairer and then the read-only policy over `sql`,
/// exactly as one pipeline round would before execution.
pub fn evaluate(sql: &str, known: &KnownIdentifiers, similarity_threshold: f64) -> ValidationReport {
    let repair = HeuristicRepairer::new(similarity_threshold).repair(sql, known);
    let verdict = ReadOnlyPolicy::default().validate(&repair.sql);
    ValidationReport {
        original: sql.to_string(),
        repaired: repair.sql,
        corrections: repair.corrections,
        verdict,
    }
}

/// Without `against_target` no identifiers are known, so only literal quoting
/// and terminator trimming can apply.
pub fn run(sql: &str, against_target: bool) -> CommandResult {
    let config = match load_config("validate") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let known = if against_target {
        let runtime = match runtime("validate") {
            Ok(runtime) => runtime,
            Err(result) => return result,
        };
        let described = runtime.block_on(async {
            let targets = TargetRegistry::from_config(&config.target).await?;
            SqliteSchemaDescriptor::new(targets, 0).describe(&ConnectionRef::default()).await
        });
        match described {
            Ok(description) => description.identifiers(),
            Err(error) => {
                return CommandResult::failure("validate", "db_connectivity", error.to_string(), 4);
            }
        }
    } else {
        KnownIdentifiers::default()
    };

    let report = evaluate(sql, &known, config.pipeline.similarity_threshold);
    let data = serde_json::to_value(&report).ok();
    match report.verdict.rejection() {
        None => CommandResult::success_with_data(
            "validate",
            format!("accepted: {}", report.repaired),
            data,
        ),
        Some(rejection) => CommandResult::failure_with_data(
            "validate",
            "policy_rejection",
            rejection.diagnostic(),
            1,
            data,
        ),
    }
}
