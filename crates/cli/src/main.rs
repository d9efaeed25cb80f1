use std::process::ExitCode;

fn main() -> ExitCode {
    counsel_cli::run()
}
