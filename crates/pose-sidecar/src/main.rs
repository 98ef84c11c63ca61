use std::io::Write;
use std::process::ExitCode;

fn main() -> ExitCode {
    match pose_sidecar::run_sidecar() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "pose-sidecar: {error}");
            ExitCode::FAILURE
        }
    }
}
