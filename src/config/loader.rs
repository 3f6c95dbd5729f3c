//! Configuration loading
//!
//! The application config is TOML with `${VAR}` substitution and `PGMASK_*`
//! environment overrides. The anonymization schema is YAML.

use super::schema::PgMaskConfig;
use super::spec::AnonymizationSpec;
use crate::domain::errors::PgMaskError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads the application configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into PgMaskConfig
/// 4. Applies environment variable overrides (PGMASK_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`PgMaskError::Configuration`] if the file cannot be read or parsed,
/// a referenced environment variable is unset, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use pgmask::config::load_config;
///
/// let config = load_config("pgmask.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<PgMaskConfig> {
    let contents = read_file(path.as_ref(), "Configuration")?;
    let contents = substitute_env_vars(&contents)?;

    let mut config: PgMaskConfig = toml::from_str(&contents)
        .map_err(|e| PgMaskError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        PgMaskError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Loads and validates the YAML anonymization schema
///
/// `${VAR}` placeholders are substituted the same way as in the TOML config.
///
/// # Errors
///
/// Returns a configuration-class error on read, parse or validation failure.
pub fn load_anonymization_spec(path: impl AsRef<Path>) -> Result<AnonymizationSpec> {
    let contents = read_file(path.as_ref(), "Anonymization schema")?;
    parse_anonymization_spec(&contents)
}

/// Parses and validates an anonymization schema held in memory
pub fn parse_anonymization_spec(contents: &str) -> Result<AnonymizationSpec> {
    let contents = substitute_env_vars(contents)?;
    let spec: AnonymizationSpec = serde_yaml::from_str(&contents)?;
    spec.validate()?;
    Ok(spec)
}

fn read_file(path: &Path, what: &str) -> Result<String> {
    if !path.exists() {
        return Err(PgMaskError::Configuration(format!(
            "{what} file not found: {}",
            path.display()
        )));
    }

    fs::read_to_string(path).map_err(|e| {
        PgMaskError::Configuration(format!(
            "Failed to read {} file {}: {}",
            what.to_lowercase(),
            path.display(),
            e
        ))
    })
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines (TOML and YAML both use `#`) are left alone.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| PgMaskError::Other(format!("invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |cap: &regex::Captures<'_>| {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    cap[0].to_string()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(PgMaskError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the PGMASK_* prefix
///
/// Variables follow the pattern PGMASK_<SECTION>_<KEY>, for example
/// PGMASK_EXECUTION_BATCH_SIZE or PGMASK_POSTGRESQL_CONNECTION_STRING.
/// Values that fail to parse are ignored.
fn apply_env_overrides(config: &mut PgMaskConfig) {
    fn var(name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
        var(name).and_then(|v| v.parse().ok())
    }

    // Application
    if let Some(val) = var("PGMASK_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = parsed("PGMASK_APPLICATION_DRY_RUN") {
        config.application.dry_run = val;
    }
    if let Some(val) = var("PGMASK_APPLICATION_SCHEMA_FILE") {
        config.application.schema_file = Some(val);
    }
    if let Some(val) = var("PGMASK_APPLICATION_DUMP_FILE") {
        config.application.dump_file = Some(val);
    }

    // PostgreSQL
    if let Some(val) = var("PGMASK_POSTGRESQL_CONNECTION_STRING") {
        config.postgresql.connection_string = super::secret_string(val);
    }
    if let Some(val) = parsed("PGMASK_POSTGRESQL_MAX_CONNECTIONS") {
        config.postgresql.max_connections = val;
    }
    if let Some(val) = var("PGMASK_POSTGRESQL_SSL_MODE") {
        config.postgresql.ssl_mode = val;
    }

    // Execution
    if let Some(val) = parsed("PGMASK_EXECUTION_BATCH_SIZE") {
        config.execution.batch_size = val;
    }
    if let Some(val) = parsed("PGMASK_EXECUTION_PARALLEL_TABLES") {
        config.execution.parallel_tables = val;
    }
    if let Some(val) = parsed("PGMASK_EXECUTION_FAILURE_POLICY") {
        config.execution.failure_policy = val;
    }
    if let Some(val) = parsed("PGMASK_EXECUTION_STOP_ON_FIRST_ERROR") {
        config.execution.stop_on_first_error = val;
    }
    if let Some(val) = parsed("PGMASK_EXECUTION_RETRY_MAX_RETRIES") {
        config.execution.retry.max_retries = val;
    }

    // Logging
    if let Some(val) = parsed("PGMASK_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val;
    }
    if let Some(val) = var("PGMASK_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
}
