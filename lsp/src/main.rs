//! Livecode Language Server
//!
//! Checks scripts as they are edited and runs them incrementally, publishing
//! syntax errors as diagnostics and execution results as notifications.
//!
//! # Usage
//!
//! ```bash
//! livecode-lsp --stdio
//! ```
//!
//! The server communicates over stdin/stdout using the LSP protocol.

use livecode_core::EngineConfig;
use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

mod backend;
mod protocol;

#[cfg(test)]
mod tests;

use backend::LivecodeBackend;

#[tokio::main]
async fn main() {
    let config = match EngineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Set up logging; stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str())),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let use_stdio = args.iter().any(|a| a == "--stdio");

    if !use_stdio {
        eprintln!("Livecode Language Server");
        eprintln!("Usage: livecode-lsp --stdio");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  --stdio    Use stdin/stdout for communication (required)");
        std::process::exit(1);
    }

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| LivecodeBackend::new(client, config));

    Server::new(stdin, stdout, socket).serve(service).await;
}
