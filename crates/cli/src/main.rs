use std::process::ExitCode;

fn main() -> ExitCode {
    homequote_cli::run()
}
