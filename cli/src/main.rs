//! meshbench: relay and cluster port-forward manager

use clap::Parser;
use tracing_subscriber::EnvFilter;

use meshbench_cli::cli::Cli;
use meshbench_cli::output::json;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = cli.json;

    match cli.run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let message = format!("{e:#}");
            match json_mode.then(|| json::format_error(&message, "ERROR")) {
                Some(Ok(body)) => println!("{body}"),
                _ => eprintln!("Error: {message}"),
            }
            std::process::exit(1);
        }
    }
}

/// Diagnostic events go to stderr, enabled by `--verbose` or `RUST_LOG`.
fn init_tracing(verbose: bool) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("meshbench_cli=debug"),
        Err(_) => return,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
