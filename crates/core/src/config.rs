use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resolver::WorkflowPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub currency: CurrencyConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub api_port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CurrencyConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

/// Workflow knobs the source left ambiguous; explicit configuration, never
/// hardcoded defaults scattered across call sites.
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub default_percentage: u8,
    pub require_manager_approval: bool,
    pub sequential: bool,
}

impl WorkflowConfig {
    pub fn policy(&self) -> WorkflowPolicy {
        WorkflowPolicy {
            percentage: self.default_percentage,
            require_manager_approval: self.require_manager_approval,
            sequential: self.sequential,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub currency_base_url: Option<String>,
    pub default_percentage: Option<u8>,
    pub require_manager_approval: Option<bool>,
    pub sequential: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://outlay.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                api_port: 8080,
                health_check_port: 8081,
                graceful_shutdown_secs: 15,
            },
            currency: CurrencyConfig {
                base_url: "https://api.exchangerate-api.com/v4".to_string(),
                api_key: None,
                timeout_secs: 10,
            },
            workflow: WorkflowConfig {
                default_percentage: 100,
                require_manager_approval: false,
                sequential: false,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Load order: built-in defaults, then `outlay.toml` (if found), then
    /// `OUTLAY_*` environment variables, then programmatic overrides, then
    /// validation.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("outlay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(api_port) = server.api_port {
                self.server.api_port = api_port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(currency) = patch.currency {
            if let Some(base_url) = currency.base_url {
                self.currency.base_url = base_url;
            }
            if let Some(api_key_value) = currency.api_key {
                self.currency.api_key = Some(api_key_value.into());
            }
            if let Some(timeout_secs) = currency.timeout_secs {
                self.currency.timeout_secs = timeout_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(default_percentage) = workflow.default_percentage {
                self.workflow.default_percentage = default_percentage;
            }
            if let Some(require_manager_approval) = workflow.require_manager_approval {
                self.workflow.require_manager_approval = require_manager_approval;
            }
            if let Some(sequential) = workflow.sequential {
                self.workflow.sequential = sequential;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("OUTLAY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("OUTLAY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("OUTLAY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("OUTLAY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("OUTLAY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTLAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("OUTLAY_SERVER_API_PORT") {
            self.server.api_port = parse_u16("OUTLAY_SERVER_API_PORT", &value)?;
        }
        if let Some(value) = read_env("OUTLAY_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("OUTLAY_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("OUTLAY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("OUTLAY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTLAY_CURRENCY_BASE_URL") {
            self.currency.base_url = value;
        }
        if let Some(value) = read_env("OUTLAY_CURRENCY_API_KEY") {
            self.currency.api_key = Some(value.into());
        }
        if let Some(value) = read_env("OUTLAY_CURRENCY_TIMEOUT_SECS") {
            self.currency.timeout_secs = parse_u64("OUTLAY_CURRENCY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTLAY_WORKFLOW_DEFAULT_PERCENTAGE") {
            self.workflow.default_percentage =
                parse_u8("OUTLAY_WORKFLOW_DEFAULT_PERCENTAGE", &value)?;
        }
        if let Some(value) = read_env("OUTLAY_WORKFLOW_REQUIRE_MANAGER_APPROVAL") {
            self.workflow.require_manager_approval =
                parse_bool("OUTLAY_WORKFLOW_REQUIRE_MANAGER_APPROVAL", &value)?;
        }
        if let Some(value) = read_env("OUTLAY_WORKFLOW_SEQUENTIAL") {
            self.workflow.sequential = parse_bool("OUTLAY_WORKFLOW_SEQUENTIAL", &value)?;
        }

        let log_level = read_env("OUTLAY_LOGGING_LEVEL").or_else(|| read_env("OUTLAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("OUTLAY_LOGGING_FORMAT").or_else(|| read_env("OUTLAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(currency_base_url) = overrides.currency_base_url {
            self.currency.base_url = currency_base_url;
        }
        if let Some(default_percentage) = overrides.default_percentage {
            self.workflow.default_percentage = default_percentage;
        }
        if let Some(require_manager_approval) = overrides.require_manager_approval {
            self.workflow.require_manager_approval = require_manager_approval;
        }
        if let Some(sequential) = overrides.sequential {
            self.workflow.sequential = sequential;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_currency(&self.currency)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("outlay.toml"), PathBuf::from("config/outlay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.api_port == 0 {
        return Err(ConfigError::Validation("server.api_port must be greater than zero".to_string()));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.api_port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.api_port and server.health_check_port must differ".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_currency(currency: &CurrencyConfig) -> Result<(), ConfigError> {
    if !currency.base_url.starts_with("http://") && !currency.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "currency.base_url must start with http:// or https://".to_string(),
        ));
    }

    if currency.timeout_secs == 0 || currency.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "currency.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.default_percentage > 100 {
        return Err(ConfigError::Validation(
            "workflow.default_percentage must be in range 0..=100".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.parse::<u8>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    currency: Option<CurrencyPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    api_port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CurrencyPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    default_percentage: Option<u8>,
    require_manager_approval: Option<bool>,
    sequential: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate() {
        let _guard = env_lock().lock().expect("env lock");
        let config = AppConfig::load(LoadOptions::default()).expect("defaults load");
        assert_eq!(config.workflow.default_percentage, 100);
        assert!(!config.workflow.require_manager_approval);
        assert!(!config.workflow.sequential);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_RATES_KEY", "rk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("outlay.toml");
            fs::write(
                &path,
                r#"
[currency]
api_key = "${TEST_RATES_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            use secrecy::ExposeSecret;
            ensure(
                config
                    .currency
                    .api_key
                    .as_ref()
                    .map(|key| key.expose_secret() == "rk-from-env")
                    .unwrap_or(false),
                "api key should be loaded from environment",
            )
        })();

        clear_vars(&["TEST_RATES_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OUTLAY_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("OUTLAY_WORKFLOW_DEFAULT_PERCENTAGE", "60");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("outlay.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[workflow]
default_percentage = 80

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(
                config.workflow.default_percentage == 60,
                "env percentage should win over file",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["OUTLAY_DATABASE_URL", "OUTLAY_WORKFLOW_DEFAULT_PERCENTAGE"]);
        result
    }

    #[test]
    fn validation_rejects_out_of_range_percentage() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OUTLAY_WORKFLOW_DEFAULT_PERCENTAGE", "150");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("default_percentage")
            );
            ensure(has_message, "validation failure should mention default_percentage")
        })();

        clear_vars(&["OUTLAY_WORKFLOW_DEFAULT_PERCENTAGE"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OUTLAY_CURRENCY_API_KEY", "rk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("rk-secret-value"), "debug output should not contain api key")
        })();

        clear_vars(&["OUTLAY_CURRENCY_API_KEY"]);
        result
    }
}
