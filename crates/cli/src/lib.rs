pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::commands::ask::AskArgs;

#[derive(Debug, Parser)]
#[command(
    name = "textsql",
    about = "Text-to-SQL operator CLI",
    long_about = "Ask questions of the target database, preview the read-only policy, inspect schema and configuration, and prepare databases.",
    after_help = "Examples:\n  textsql seed\n  textsql ask \"Which students major in CS?\"\n  textsql validate \"SELECT * FROM studnets\" --against-target\n  textsql doctor --json"
)]
pub struct Cli {
    /// Log pipeline events to stderr at the configured level.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer a natural-language question with a read-only SQL query")]
    Ask {
        question: String,
        #[arg(long, help = "Registered connection to query (defaults to the configured target)")]
        connection: Option<String>,
        #[arg(long = "customer", help = "Customer whose prompt overrides apply")]
        customer_id: Option<String>,
        #[arg(long, help = "Total generation/repair rounds for this question")]
        retry_budget: Option<u32>,
        #[arg(long, help = "Skip the natural-language summary")]
        no_summary: bool,
    },
    #[command(about = "Run heuristic repair and the read-only policy over a SQL statement offline")]
    Validate {
        sql: String,
        #[arg(long, help = "Correct identifiers against the target database schema")]
        against_target: bool,
    },
    #[command(about = "Introspect the target database schema")]
    Schema,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Apply pending prompt-store migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo university dataset into the target database")]
    Seed,
    #[command(about = "Validate config, LLM client setup, and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .compact()
        .init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    if cli.verbose {
        init_logging();
    }

    let result = match cli.command {
        Command::Ask { question, connection, customer_id, retry_budget, no_summary } => {
            commands::ask::run(AskArgs {
                question,
                connection,
                customer_id,
                retry_budget,
                summarize: !no_summary,
            })
        }
        Command::Validate { sql, against_target } => commands::validate::run(&sql, against_target),
        Command::Schema => commands::schema::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            let (exit_code, output) = commands::doctor::run(json);
            commands::CommandResult { exit_code, output }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn ask_flags_parse() {
        let cli = Cli::try_parse_from([
            "textsql",
            "ask",
            "Who majors in CS?",
            "--customer",
            "acme",
            "--retry-budget",
            "2",
            "--no-summary",
        ])
        .expect("arguments should parse");

        match cli.command {
            Command::Ask { question, customer_id, retry_budget, no_summary, connection } => {
                assert_eq!(question, "Who majors in CS?");
                assert_eq!(customer_id.as_deref(), Some("acme"));
                assert_eq!(retry_budget, Some(2));
                assert!(no_summary);
                assert!(connection.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verbose_is_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from(["textsql", "doctor", "--json", "--verbose"])
            .expect("arguments should parse");

        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Doctor { json: true }));
    }
}
