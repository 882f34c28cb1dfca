use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = lox_run::Cli::parse();
    cli.init_tracing();

    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            for report in failure.reports() {
                eprintln!("{:?}", report);
            }
            ExitCode::from(failure.exit_code())
        }
    }
}
