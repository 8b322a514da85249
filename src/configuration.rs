use config::ConfigError;

use crate::error::AppError;

/// Shortest signing secret accepted at startup (HS256 key size)
pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub hashing: HashingSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Ceiling on every identity store call
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.store_timeout_secs)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64, // seconds
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64, // seconds
}

/// Password hashing settings
#[derive(serde::Deserialize, Clone)]
pub struct HashingSettings {
    #[serde(default = "default_cost")]
    pub cost: u32,
    /// Hashes allowed to run at once on the blocking pool
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for HashingSettings {
    fn default() -> Self {
        Self {
            cost: default_cost(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_store_timeout_secs() -> u64 {
    100
}

fn default_max_connections() -> u32 {
    5
}

fn default_issuer() -> String {
    "authgate".to_string()
}

fn default_access_token_expiry() -> i64 {
    24 * 60 * 60
}

fn default_refresh_token_expiry() -> i64 {
    168 * 60 * 60
}

fn default_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_max_concurrent() -> usize {
    4
}

impl Settings {
    /// Reject settings the service cannot safely start with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.jwt.secret.trim().is_empty() {
            return Err(AppError::Config("jwt.secret is required".to_string()));
        }
        if self.jwt.secret.len() < MIN_SECRET_LENGTH {
            return Err(AppError::Config(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.jwt.access_token_expiry <= 0 || self.jwt.refresh_token_expiry <= 0 {
            return Err(AppError::Config(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if self.application.store_timeout_secs == 0 {
            return Err(AppError::Config(
                "application.store_timeout_secs must be positive".to_string(),
            ));
        }
        if !(4..=31).contains(&self.hashing.cost) {
            return Err(AppError::Config(
                "hashing.cost must be between 4 and 31".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from `configuration.yaml` (optional) overlaid with
/// `APP_<SECTION>__<KEY>` environment variables.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
