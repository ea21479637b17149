use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use kvscope_registry::StoreRegistry;
use kvscope_rpc::{bind_listener, serve, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod version;

use config::{AppConfig, LogFormat, StoreSpec};
use version::{git_commit_hash, KVSCOPE_VERSION};

fn build_cli() -> Command {
    Command::new("kvscope")
        .version(KVSCOPE_VERSION)
        .about("Browse and edit named key-value stores over HTTP")
        .disable_version_flag(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .value_name("ADDR")
                .help("Address to listen on (e.g. 127.0.0.1:8080 or :8080)"),
        )
        .arg(
            Arg::new("dbs")
                .long("dbs")
                .value_name("STORES")
                .help("Comma-separated list of stores. Format: <name>:<path>,<name2>:<path2>"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format"),
        )
        .arg(
            Arg::new("version_flag")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print version information and exit"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    if matches.get_flag("version_flag") {
        println!("kvscope {} (commit {})", KVSCOPE_VERSION, git_commit_hash());
        return Ok(());
    }

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = AppConfig::load(config_path.as_deref())?;
    config.apply_cli(&matches)?;
    init_logging(&config)?;
    config.warn_skipped_stores();

    if config.stores.is_empty() {
        bail!("no stores configured. Usage: kvscope --dbs \"<name>:<path>[,<name2>:<path2>]\"");
    }

    let registry = Arc::new(StoreRegistry::new());
    let result = run(&config, registry.clone()).await;

    let report = registry.shutdown();
    if report.is_clean() {
        info!("Closed {} store(s)", report.closed.len());
    } else {
        for (name, err) in &report.failed {
            error!("Store '{}' did not close cleanly: {}", name, err);
        }
    }

    result
}

async fn run(config: &AppConfig, registry: Arc<StoreRegistry>) -> Result<()> {
    register_stores(&registry, &config.stores)?;

    let listener = bind_listener(&config.listen).await?;
    let state = AppState::new(registry).with_max_body_bytes(config.max_body_bytes);
    info!("kvscope {} starting on {}", KVSCOPE_VERSION, config.listen);
    serve(state, listener, shutdown_signal()).await
}

fn register_stores(registry: &StoreRegistry, stores: &[StoreSpec]) -> Result<()> {
    for spec in stores {
        registry
            .register(&spec.name, &spec.path)
            .with_context(|| {
                format!(
                    "Failed to register store '{}' at '{}'",
                    spec.name,
                    spec.path.display()
                )
            })?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, stopping HTTP server");
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cli_overrides_file_config() {
        let matches = build_cli().get_matches_from([
            "kvscope",
            "--listen",
            ":9000",
            "--dbs",
            "a:/tmp/a,b:/tmp/b,oops",
            "--log-format",
            "json",
        ]);
        let mut config = AppConfig::load(None).unwrap();
        config.apply_cli(&matches).unwrap();

        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(config.stores.len(), 2);
        assert_eq!(config.skipped_stores, vec!["oops"]);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn cli_rejects_unknown_log_level() {
        let result = build_cli().try_get_matches_from(["kvscope", "--log-level", "loud"]);
        assert!(result.is_err());
    }

    #[test]
    fn register_stores_stops_at_first_failure() {
        let dir = TempDir::new().expect("temp dir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file, not a directory").unwrap();

        let stores = vec![
            StoreSpec {
                name: "good".into(),
                path: dir.path().join("good"),
            },
            StoreSpec {
                name: "bad".into(),
                path: blocker,
            },
        ];

        let registry = StoreRegistry::new();
        let err = register_stores(&registry, &stores).unwrap_err();
        assert!(format!("{err:#}").contains("bad"));
        assert_eq!(registry.names(), vec!["good"]);
        assert!(registry.shutdown().is_clean());
    }

    #[test]
    fn duplicate_names_in_store_list_fail() {
        let dir = TempDir::new().expect("temp dir");
        let stores = vec![
            StoreSpec {
                name: "dup".into(),
                path: dir.path().join("one"),
            },
            StoreSpec {
                name: "dup".into(),
                path: dir.path().join("two"),
            },
        ];

        let registry = StoreRegistry::new();
        assert!(register_stores(&registry, &stores).is_err());
        assert_eq!(registry.len(), 1);
        registry.shutdown();
    }
}
