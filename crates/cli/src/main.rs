use std::process::ExitCode;

fn main() -> ExitCode {
    miled_cli::run()
}
