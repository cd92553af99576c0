use std::process::ExitCode;

fn main() -> ExitCode {
    swarmdesk_cli::run()
}
