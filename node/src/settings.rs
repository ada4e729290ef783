use anyhow::{Context, Result};
use config::{Config, File as ConfigFile};
use std::path::{Path, PathBuf};
use tabinfer_store::TableLayout;

pub const DEFAULT_CONFIG_PATH: &str = "config/tabinfer.toml";
pub const ENV_PREFIX: &str = "TABINFER";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 6968;
const DEFAULT_MODEL_PATH: &str = "model.json";
const DEFAULT_DB_SCRIPT_PATH: &str = "model.sql";
const DEFAULT_DB_PATH: &str = "model.db";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_FORMAT: &str = "pretty";

/// Resolved process configuration
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub config_path: Option<PathBuf>,

    // Network
    pub host: String,
    pub port: u16,

    // Model artifact
    pub model_path: PathBuf,
    pub model_hash: Option<String>,

    // Reference store
    pub db_script_path: PathBuf,
    pub db_path: PathBuf,
    pub table: String,
    pub id_column: String,
    pub outcome_column: String,

    // Logging
    pub log_level: String,
    pub log_format: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let layout = TableLayout::default();
        Self {
            config_path: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_hash: None,
            db_script_path: PathBuf::from(DEFAULT_DB_SCRIPT_PATH),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            table: layout.table,
            id_column: layout.id_column,
            outcome_column: layout.outcome_column,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl NodeConfig {
    /// Defaults, then the config file, then `TABINFER_*` environment variables
    pub fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                Some(path)
            } else {
                None
            }
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let config = builder.build()?;
        Self::from_source(&config, resolved_path)
    }

    fn from_source(config: &Config, config_path: Option<PathBuf>) -> Result<Self> {
        let defaults = Self::default();

        let port = match get_string_value(config, &["port", "server.port"]) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid port value '{raw}'"))?,
            None => defaults.port,
        };

        Ok(Self {
            config_path,
            host: get_string_value(config, &["host", "server.host"]).unwrap_or(defaults.host),
            port,
            model_path: get_string_value(config, &["model_path", "model.path"])
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            model_hash: get_string_value(config, &["model_hash", "model.hash"]),
            db_script_path: get_string_value(config, &["db_script_path", "store.script_path"])
                .map(PathBuf::from)
                .unwrap_or(defaults.db_script_path),
            db_path: get_string_value(config, &["db_path", "store.db_path"])
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            table: get_string_value(config, &["table", "store.table"]).unwrap_or(defaults.table),
            id_column: get_string_value(config, &["id_column", "store.id_column"])
                .unwrap_or(defaults.id_column),
            outcome_column: get_string_value(config, &["outcome_column", "store.outcome_column"])
                .unwrap_or(defaults.outcome_column),
            log_level: get_string_value(config, &["log_level", "logging.level"])
                .unwrap_or(defaults.log_level),
            log_format: get_string_value(config, &["log_format", "logging.format"])
                .unwrap_or(defaults.log_format),
        })
    }

    /// Apply command-line overrides on top of file and environment values
    pub fn apply_overrides(&mut self, matches: &clap::ArgMatches) {
        if let Some(host) = matches.get_one::<String>("host") {
            self.host = host.clone();
        }

        if let Some(port) = matches.get_one::<u16>("port") {
            self.port = *port;
        }

        if let Some(path) = matches.get_one::<String>("model-path") {
            self.model_path = PathBuf::from(path);
        }

        if let Some(hash) = matches.get_one::<String>("model-hash") {
            self.model_hash = Some(hash.clone());
        }

        if let Some(path) = matches.get_one::<String>("db-script") {
            self.db_script_path = PathBuf::from(path);
        }

        if let Some(path) = matches.get_one::<String>("db-path") {
            self.db_path = PathBuf::from(path);
        }

        if let Some(level) = matches.get_one::<String>("log-level") {
            self.log_level = level.clone();
        }

        if let Some(format) = matches.get_one::<String>("log-format") {
            self.log_format = format.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("HOST must not be empty");
        }
        if self.port == 0 {
            anyhow::bail!("PORT must be greater than zero");
        }
        for (label, path) in [
            ("MODEL_PATH", &self.model_path),
            ("DB_SCRIPT_PATH", &self.db_script_path),
            ("DB_PATH", &self.db_path),
        ] {
            if is_blank(path) {
                anyhow::bail!("{label} must not be empty");
            }
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            anyhow::bail!(
                "LOG_FORMAT must be 'pretty' or 'json', got '{}'",
                self.log_format
            );
        }
        self.table_layout().validate()?;
        Ok(())
    }

    pub fn table_layout(&self) -> TableLayout {
        TableLayout {
            table: self.table.clone(),
            id_column: self.id_column.clone(),
            outcome_column: self.outcome_column.clone(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn new(key: &'static str, value: &str) -> Self {
            let previous = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            if let Some(prev) = &self.previous {
                std::env::set_var(self.key, prev);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }

    fn from_toml(contents: &str) -> NodeConfig {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tabinfer.toml");
        fs::write(&path, contents).unwrap();
        let config = Config::builder()
            .add_source(ConfigFile::from(path.as_path()))
            .build()
            .unwrap();
        NodeConfig::from_source(&config, Some(path)).unwrap()
    }

    #[test]
    fn empty_source_yields_defaults() {
        let config = Config::builder().build().unwrap();
        let loaded = NodeConfig::from_source(&config, None).unwrap();

        assert_eq!(loaded, NodeConfig::default());
        assert_eq!(loaded.bind_addr(), "0.0.0.0:6968");
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn file_sections_override_defaults() {
        let loaded = from_toml(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [model]
            path = "data/model.json"

            [store]
            script_path = "data/model.sql"
            db_path = "data/model.db"
            table = "patients"

            [logging]
            format = "json"
            "#,
        );

        assert_eq!(loaded.bind_addr(), "127.0.0.1:8080");
        assert_eq!(loaded.model_path, PathBuf::from("data/model.json"));
        assert_eq!(loaded.db_script_path, PathBuf::from("data/model.sql"));
        assert_eq!(loaded.db_path, PathBuf::from("data/model.db"));
        assert_eq!(loaded.table, "patients");
        assert_eq!(loaded.id_column, "id");
        assert_eq!(loaded.log_format, "json");
        assert!(loaded.model_hash.is_none());
    }

    // The only test in this crate that touches TABINFER_* variables.
    #[test]
    fn environment_overrides_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tabinfer.toml");
        fs::write(
            &path,
            "[server]\nhost = \"127.0.0.1\"\nport = 8080\n\n[model]\npath = \"file.json\"\n",
        )
        .unwrap();

        let _port = EnvVarGuard::new("TABINFER_PORT", "9100");
        let _model = EnvVarGuard::new("TABINFER_MODEL_PATH", "env.json");

        let loaded = NodeConfig::load(path.to_str()).unwrap();
        assert_eq!(loaded.port, 9100);
        assert_eq!(loaded.model_path, PathBuf::from("env.json"));
        assert_eq!(loaded.host, "127.0.0.1");
        assert_eq!(loaded.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tabinfer.toml");
        fs::write(&path, "[server]\nport = \"not-a-port\"\n").unwrap();
        let config = Config::builder()
            .add_source(ConfigFile::from(path.as_path()))
            .build()
            .unwrap();

        assert!(NodeConfig::from_source(&config, None).is_err());
    }

    #[test]
    fn missing_explicit_config_file_fails() {
        let err = NodeConfig::load(Some("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = NodeConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.log_format = "xml".into();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.db_path = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.outcome_column = String::new();
        assert!(config.validate().is_err());
    }
}
