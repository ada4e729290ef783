use anyhow::{Context, Result};
use clap::{value_parser, Arg, Command};
use std::sync::Arc;
use tabinfer_api::{start_server, AppState, ModelInfo};
use tabinfer_model::load_predictor;
use tabinfer_store::{initialize, SqliteReferenceStore};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod settings;
mod version;

use settings::NodeConfig;
use version::{git_commit_hash, TABINFER_VERSION};

fn build_cli() -> Command {
    Command::new("tabinfer-node")
        .version(TABINFER_VERSION)
        .about("Serve a tabular classification model over HTTP")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Override HTTP bind host"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override HTTP port"),
        )
        .arg(
            Arg::new("model-path")
                .long("model-path")
                .value_name("FILE")
                .help("Model artifact to load at startup"),
        )
        .arg(
            Arg::new("model-hash")
                .long("model-hash")
                .value_name("HEX")
                .help("Refuse to start unless the model's blake3 hash matches"),
        )
        .arg(
            Arg::new("db-script")
                .long("db-script")
                .value_name("FILE")
                .help("SQL script that builds the reference table"),
        )
        .arg(
            Arg::new("db-path")
                .long("db-path")
                .value_name("FILE")
                .help("Location of the embedded reference store"),
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
}

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<NodeConfig> {
    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = NodeConfig::load(config_path)?;
    config.apply_overrides(matches);
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &NodeConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    Ok(())
}

/// Build the reference store, then load the model; either failure is fatal.
fn bootstrap(config: &NodeConfig) -> Result<AppState> {
    initialize(&config.db_script_path, &config.db_path).with_context(|| {
        format!(
            "failed to initialize reference store from {}",
            config.db_script_path.display()
        )
    })?;

    let store = SqliteReferenceStore::new(&config.db_path, config.table_layout())?;
    match store.row_count() {
        Ok(rows) => info!(rows, table = %config.table, "reference table ready"),
        Err(err) => warn!("reference table {} is not readable: {err}", config.table),
    }

    let model = load_predictor(&config.model_path, config.model_hash.as_deref())
        .with_context(|| format!("failed to load model from {}", config.model_path.display()))?;
    let model_info = ModelInfo::from_model(&model)?;

    Ok(AppState::new(Arc::new(model), Arc::new(store), model_info))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let config = load_config_with_overrides(&matches)?;
    init_logging(&config)?;

    info!(
        version = TABINFER_VERSION,
        commit = git_commit_hash(),
        config = ?config.config_path,
        "starting tabinfer node"
    );

    let state = bootstrap(&config)?;
    start_server(state, &config.bind_addr()).await
}
