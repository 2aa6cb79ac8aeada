use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Username and API key for the EPC open data registry (HTTP Basic auth).
#[derive(Clone, PartialEq, Eq)]
pub struct EpcCredentials {
    pub username: String,
    pub api_key: String,
}

impl std::fmt::Debug for EpcCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpcCredentials")
            .field("username", &self.username)
            .field("api_key", &"[redacted]")
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub api_key_hash_salt: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub provider_timeout_secs: u64,
    pub provider_user_agent: String,
    pub geocoder_base_url: String,
    pub epc_base_url: String,
    pub police_base_url: String,
    /// `None` unless both `EPC_API_USERNAME` and `EPC_API_KEY` are set.
    pub epc_credentials: Option<EpcCredentials>,
    pub provider_rate_limit: u32,
    pub provider_rate_window_secs: u64,
    pub api_rate_limit_per_minute: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("api_key_hash_salt", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("provider_user_agent", &self.provider_user_agent)
            .field("geocoder_base_url", &self.geocoder_base_url)
            .field("epc_base_url", &self.epc_base_url)
            .field("police_base_url", &self.police_base_url)
            .field("epc_credentials", &self.epc_credentials)
            .field("provider_rate_limit", &self.provider_rate_limit)
            .field("provider_rate_window_secs", &self.provider_rate_window_secs)
            .field("api_rate_limit_per_minute", &self.api_rate_limit_per_minute)
            .finish()
    }
}
