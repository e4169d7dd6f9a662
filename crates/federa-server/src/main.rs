use std::path::PathBuf;

use clap::Parser;
use federa_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use federa_server::{ServerBuilder, observability};

/// Identity broker login server.
#[derive(Debug, Parser)]
#[command(name = "federa-server", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "FEDERA_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();

    // Initialize tracing early with the default level
    observability::init_tracing();

    let config_path = cli.config.to_string_lossy().to_string();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    if !observability::apply_logging_level(&cfg.logging.level) {
        tracing::info!(level = %cfg.logging.level, "RUST_LOG is set, logging.level ignored");
    }
    tracing::info!(
        path = %config_path,
        backends = cfg.broker.backends.len(),
        "Configuration loaded"
    );

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err:#}");
        std::process::exit(1);
    }
}
