//! pki - operator CLI for the private certificate authority

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match pki_cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            pki_cli::cli::report(&e);
            ExitCode::FAILURE
        }
    }
}
