use std::process::ExitCode;

fn main() -> ExitCode {
    match impact_lab::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("impact: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
