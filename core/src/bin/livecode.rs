/// Livecode CLI
///
/// Checks scripts and runs successive revisions of a program through the
/// incremental engine.

use livecode_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
