use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use config::{Config, Environment, File as ConfigFile};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_MAX_BODY_BYTES: usize = kvscope_rpc::DEFAULT_MAX_BODY_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => bail!("unknown log format '{other}' (expected 'pretty' or 'json')"),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        };
        f.write_str(value)
    }
}

/// One `name:path` pair from the store list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSpec {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: String,
    pub stores: Vec<StoreSpec>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub max_body_bytes: usize,
    /// Store entries that were not `name:path` pairs. Reported once logging
    /// is up, see [`AppConfig::warn_skipped_stores`].
    pub skipped_stores: Vec<String>,
}

impl AppConfig {
    /// Defaults, then the optional config file, then `KVSCOPE_*` variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("listen", DEFAULT_LISTEN)?
            .set_default("dbs", "")?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?
            .set_default("log_format", LogFormat::Pretty.to_string())?
            .set_default("max_body_bytes", DEFAULT_MAX_BODY_BYTES as i64)?;

        if let Some(path) = config_path {
            if !path.exists() {
                bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("KVSCOPE"));
        let config = builder.build().context("failed to load configuration")?;

        let max_body_bytes = config
            .get_int("max_body_bytes")
            .context("max_body_bytes must be an integer")?;
        let max_body_bytes = usize::try_from(max_body_bytes)
            .ok()
            .filter(|bytes| *bytes > 0)
            .with_context(|| format!("max_body_bytes must be positive, got {max_body_bytes}"))?;

        let stores = parse_store_specs(&config.get_string("dbs")?)?;
        Ok(Self {
            listen: normalize_listen(&config.get_string("listen")?),
            stores: stores.specs,
            log_level: config.get_string("log_level")?,
            log_format: LogFormat::parse(&config.get_string("log_format")?)?,
            max_body_bytes,
            skipped_stores: stores.skipped,
        })
    }

    /// Command-line flags win over every other source.
    pub fn apply_cli(&mut self, matches: &ArgMatches) -> Result<()> {
        if let Some(listen) = matches.get_one::<String>("listen") {
            self.listen = normalize_listen(listen);
        }
        if let Some(dbs) = matches.get_one::<String>("dbs") {
            let stores = parse_store_specs(dbs)?;
            self.stores = stores.specs;
            self.skipped_stores = stores.skipped;
        }
        if let Some(level) = matches.get_one::<String>("log-level") {
            self.log_level = level.clone();
        }
        if let Some(format) = matches.get_one::<String>("log-format") {
            self.log_format = LogFormat::parse(format)?;
        }
        Ok(())
    }

    pub fn warn_skipped_stores(&self) {
        for entry in &self.skipped_stores {
            warn!("Ignoring store entry '{}': expected <name>:<path>", entry);
        }
    }
}

/// Accepts the short `:8080` form and binds it on every interface.
pub fn normalize_listen(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedStores {
    pub specs: Vec<StoreSpec>,
    /// Entries without a `:` separator.
    pub skipped: Vec<String>,
}

/// Parses `name:path[,name2:path2...]`. Entries are split on the first `:`;
/// entries without one are collected in [`ParsedStores::skipped`].
pub fn parse_store_specs(raw: &str) -> Result<ParsedStores> {
    let mut parsed = ParsedStores::default();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let Some((name, path)) = pair.split_once(':') else {
            parsed.skipped.push(pair.to_string());
            continue;
        };
        let (name, path) = (name.trim(), path.trim());
        if name.is_empty() || path.is_empty() {
            bail!("invalid store entry '{pair}': name and path must both be non-empty");
        }
        parsed.specs.push(StoreSpec {
            name: name.to_string(),
            path: PathBuf::from(path),
        });
    }
    Ok(parsed)
}
