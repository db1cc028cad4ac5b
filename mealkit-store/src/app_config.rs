use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub fulfillment: FulfillmentConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FulfillmentConfig {
    #[serde(default = "default_storage")]
    pub storage: StorageBackend,
    #[serde(default = "default_delivery_lead_days")]
    pub delivery_lead_days: i64,
    #[serde(default = "default_checkout_timeout_ms")]
    pub checkout_timeout_ms: u64,
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i32,
}

fn default_storage() -> StorageBackend { StorageBackend::Postgres }
fn default_delivery_lead_days() -> i64 { 2 }
fn default_checkout_timeout_ms() -> u64 { 5_000 }
fn default_low_stock_threshold() -> i32 { 10 }

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            storage: default_storage(),
            delivery_lead_days: default_delivery_lead_days(),
            checkout_timeout_ms: default_checkout_timeout_ms(),
            low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout() -> u64 { 3 }
fn default_run_migrations() -> bool { true }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `MEALKIT__SERVER__PORT=8080` sets `server.port`
            .add_source(config::Environment::with_prefix("MEALKIT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
