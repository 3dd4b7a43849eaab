use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match hospital_lib::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("hospital: {e}");
            ExitCode::FAILURE
        }
    }
}
