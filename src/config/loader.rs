//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{BridgeConfig, DatabaseTarget};
use super::secret::secret_string;
use crate::domain::errors::BridgeError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into BridgeConfig
/// 4. Applies environment variable overrides (MEDBRIDGE_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - Environment variable substitution fails
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use medbridge::config::loader::load_config;
///
/// let config = load_config("medbridge.toml").expect("Failed to load config");
/// println!("{} hospitals configured", config.hospitals.len());
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<BridgeConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(BridgeError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        BridgeError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration text
///
/// Same pipeline as [`load_config`] without the file access.
pub fn parse_config(contents: &str) -> Result<BridgeConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: BridgeConfig = toml::from_str(&contents)
        .map_err(|e| BridgeError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        BridgeError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| BridgeError::Other(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        let trimmed = line.trim_start();

        // Comments keep their placeholders
        if trimmed.starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{var_name}}}");
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(BridgeError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Environment key for a per-hospital setting, e.g.
/// `MEDBRIDGE_HOSPITAL_RS_01_CLIENT_SECRET` for hospital `rs-01`
fn hospital_env_key(hospital_id: &str, field: &str) -> String {
    let id: String = hospital_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("MEDBRIDGE_HOSPITAL_{id}_{field}")
}

/// Applies environment variable overrides using MEDBRIDGE_* prefix
///
/// Environment variables follow the pattern: MEDBRIDGE_<SECTION>_<KEY>
/// For example: MEDBRIDGE_REGISTRY_BASE_URL, MEDBRIDGE_SYNC_SUBMIT_ON_EVENT
fn apply_env_overrides(config: &mut BridgeConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_APPLICATION_DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(false);
    }

    // Registry overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_REGISTRY_BASE_URL") {
        config.registry.base_url = val;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_REGISTRY_AUTH_URL") {
        config.registry.auth_url = val;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_REGISTRY_TIMEOUT_SECONDS") {
        if let Ok(timeout) = val.parse() {
            config.registry.timeout_seconds = timeout;
        }
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_REGISTRY_MAX_RETRIES") {
        if let Ok(retries) = val.parse() {
            config.registry.retry.max_retries = retries;
        }
    }

    // Hospital credentials
    for hospital in &mut config.hospitals {
        if let Ok(val) = std::env::var(hospital_env_key(&hospital.id, "CLIENT_ID")) {
            hospital.client_id = val;
        }
        if let Ok(val) = std::env::var(hospital_env_key(&hospital.id, "CLIENT_SECRET")) {
            hospital.client_secret = secret_string(val);
        }
        if let Ok(val) = std::env::var(hospital_env_key(&hospital.id, "ENABLED")) {
            hospital.enabled = val.parse().unwrap_or(hospital.enabled);
        }
    }

    // Datastore overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_DATABASE_TARGET") {
        config.database_target = match val.to_lowercase().as_str() {
            "memory" => DatabaseTarget::Memory,
            "postgresql" => DatabaseTarget::PostgreSQL,
            other => {
                return Err(BridgeError::Configuration(format!(
                    "Invalid MEDBRIDGE_DATABASE_TARGET '{other}'. Must be one of: memory, postgresql"
                )))
            }
        };
    }

    // PostgreSQL overrides (only if PostgreSQL is configured)
    if let Some(ref mut pg_config) = config.postgresql {
        if let Ok(val) = std::env::var("MEDBRIDGE_POSTGRESQL_CONNECTION_STRING") {
            pg_config.connection_string = secret_string(val);
        }
        if let Ok(val) = std::env::var("MEDBRIDGE_POSTGRESQL_MAX_CONNECTIONS") {
            if let Ok(max) = val.parse() {
                pg_config.max_connections = max;
            }
        }
        if let Ok(val) = std::env::var("MEDBRIDGE_POSTGRESQL_SSL_MODE") {
            pg_config.ssl_mode = val;
        }
    }

    // Notification overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_NOTIFICATIONS_SINK") {
        config.notifications.sink = val;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_NOTIFICATIONS_WEBHOOK_URL") {
        config.notifications.webhook_url = Some(val);
    }

    // Sync overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_SYNC_ITEM_TIMEOUT_SECONDS") {
        if let Ok(timeout) = val.parse() {
            config.sync.item_timeout_seconds = timeout;
        }
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_SYNC_SUBMIT_ON_EVENT") {
        config.sync.submit_on_event = val.parse().unwrap_or(true);
    }

    // Server overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_SERVER_BIND_ADDRESS") {
        config.server.bind_address = val;
    }

    // Logging overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
