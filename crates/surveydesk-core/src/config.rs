use crate::app_config::{AppConfig, EpcCredentials, Environment};
use crate::ConfigError;

const DEFAULT_GEOCODER_BASE_URL: &str = "https://api.postcodes.io/";
const DEFAULT_EPC_BASE_URL: &str = "https://epc.opendatacommunities.org/";
const DEFAULT_POLICE_BASE_URL: &str = "https://data.police.uk/";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Parse and validate configuration from an env-var lookup function.
///
/// Decoupled from the process environment so tests can pass a `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let api_key_hash_salt = require("SURVEYDESK_API_KEY_HASH_SALT")?;

    let env = parse_environment(&or_default("SURVEYDESK_ENV", "development"))?;

    let bind_addr = or_default("SURVEYDESK_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("SURVEYDESK_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("SURVEYDESK_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("SURVEYDESK_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SURVEYDESK_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SURVEYDESK_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let provider_timeout_secs = parse_u64("SURVEYDESK_PROVIDER_TIMEOUT_SECS", "30")?;
    let provider_user_agent = or_default(
        "SURVEYDESK_PROVIDER_USER_AGENT",
        "surveydesk/0.1 (property-research)",
    );
    let geocoder_base_url = or_default("SURVEYDESK_GEOCODER_BASE_URL", DEFAULT_GEOCODER_BASE_URL);
    let epc_base_url = or_default("SURVEYDESK_EPC_BASE_URL", DEFAULT_EPC_BASE_URL);
    let police_base_url = or_default("SURVEYDESK_POLICE_BASE_URL", DEFAULT_POLICE_BASE_URL);

    // Both halves must be present; a lone username or key is treated as unset.
    let epc_credentials = match (optional("EPC_API_USERNAME"), optional("EPC_API_KEY")) {
        (Some(username), Some(api_key)) => Some(EpcCredentials { username, api_key }),
        _ => None,
    };

    let provider_rate_limit = parse_u32("SURVEYDESK_PROVIDER_RATE_LIMIT", "5")?;
    if provider_rate_limit == 0 {
        return Err(invalid(
            "SURVEYDESK_PROVIDER_RATE_LIMIT",
            "must be at least 1".to_string(),
        ));
    }
    let provider_rate_window_secs = parse_u64("SURVEYDESK_PROVIDER_RATE_WINDOW_SECS", "3600")?;
    if provider_rate_window_secs == 0 {
        return Err(invalid(
            "SURVEYDESK_PROVIDER_RATE_WINDOW_SECS",
            "must be at least 1".to_string(),
        ));
    }
    let api_rate_limit_per_minute = parse_usize("SURVEYDESK_API_RATE_LIMIT_PER_MINUTE", "120")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        api_key_hash_salt,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        provider_timeout_secs,
        provider_user_agent,
        geocoder_base_url,
        epc_base_url,
        police_base_url,
        epc_credentials,
        provider_rate_limit,
        provider_rate_window_secs,
        api_rate_limit_per_minute,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SURVEYDESK_ENV".to_string(),
            reason: format!("expected development, test or production, got '{other}'"),
        }),
    }
}
