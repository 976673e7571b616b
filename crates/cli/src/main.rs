use std::process::ExitCode;

fn main() -> ExitCode {
    textsql_cli::run()
}
