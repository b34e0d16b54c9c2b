//! triplegate service entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build the store backend, optionally probe it
//!   6. Start the mutation worker
//!   7. Optional reset (config `reset_on_start` or `--reset`)
//!   8. Spawn Ctrl-C → shutdown signal watcher
//!   9. Run the console (if enabled) until shutdown
//!  10. Cancel token + join worker

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use triplegate::error::AppError;
use triplegate::store::backends;
use triplegate::subsystems::mutation::MutationSerializer;
use triplegate::{config, logger};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    info!(
        service = %config.service_name,
        backend = %config.store.backend,
        store_url = %config.store.url,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        apply_timeout = ?config.serializer.apply_timeout,
        call_timeout = ?config.serializer.call_timeout,
        "config loaded"
    );

    let store = backends::build(&config.store, config.access_token.clone())?;
    if config.store.probe {
        store.ping().await?;
        info!(backend = store.backend(), "store reachable");
    }

    let shutdown = CancellationToken::new();
    let (gate, worker) = MutationSerializer::start(store, config.serializer, shutdown.clone())?;

    if config.reset_on_start || args.reset {
        gate.reset().await?;
        info!("store reset and schema installed");
    }

    // Ctrl-C cancels the shared token.
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    #[cfg(feature = "console")]
    let console = config
        .console
        .then(|| triplegate::console::start(gate.clone(), shutdown.clone()));
    #[cfg(not(feature = "console"))]
    if config.console {
        warn!("console requested but the `console` feature is not compiled in");
    }

    println!("✓ {} ready ({} store)", config.service_name, config.store.backend);

    shutdown.cancelled().await;
    drop(gate);

    #[cfg(feature = "console")]
    if let Some(console) = console {
        // stdin reads cannot be interrupted; don't wait on a blocked console.
        if console.is_finished() {
            console.join().await?;
        }
    }

    if let Err(e) = worker.join().await {
        warn!(error = %e, "mutation worker exited with error");
        return Err(e);
    }
    info!("shutdown complete");
    Ok(())
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    reset: bool,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut reset = false;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: triplegate [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -c, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("      --reset                Drop all data and reinstall the schema on start");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "--reset" => reset = true,
            "-c" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -c/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // Each -v raises verbosity one tier:
    //   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path, reset }
}
