// src/state.rs
use std::sync::Arc;

use crate::errors::{RideError, RideResult};
use crate::services::{
    account_service::AccountOperations,
    cache_service::{CacheConfig, QueryCache},
    coordinator::RideCoordinator,
    http_ride_service::HttpRideService,
    notification_service::{Notifier, TracingNotifier},
    ride_service::{InMemoryRideService, RideOperations},
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a positive number, got '{value}'")]
    NotANumber { key: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl From<ConfigError> for RideError {
    fn from(err: ConfigError) -> Self {
        RideError::InvalidConfiguration(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub ride_service_url: String,
    pub request_timeout_secs: u64,
    pub page_size: u32,
    pub bearer_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ride_service_url: "http://localhost:5000/api/v1".to_string(),
            request_timeout_secs: 10,
            page_size: 10,
            bearer_token: None,
        }
    }
}

impl AppConfig {
    /// Read `RIDE_SERVICE_URL`, `RIDE_SERVICE_TIMEOUT_SECS`, `RIDE_PAGE_SIZE`
    /// and `RIDE_SERVICE_TOKEN`, falling back to the defaults.
    pub fn from_env() -> RideResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> RideResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ride_service_url = match lookup("RIDE_SERVICE_URL") {
            Some(url) if url.trim().is_empty() => return Err(ConfigError::Empty("RIDE_SERVICE_URL").into()),
            Some(url) => url.trim().to_string(),
            None => defaults.ride_service_url,
        };

        let request_timeout_secs = match lookup("RIDE_SERVICE_TIMEOUT_SECS") {
            Some(raw) => parse_positive("RIDE_SERVICE_TIMEOUT_SECS", &raw)?,
            None => defaults.request_timeout_secs,
        };

        let page_size = match lookup("RIDE_PAGE_SIZE") {
            Some(raw) => parse_positive("RIDE_PAGE_SIZE", &raw)? as u32,
            None => defaults.page_size,
        };

        let bearer_token = lookup("RIDE_SERVICE_TOKEN").filter(|t| !t.trim().is_empty());

        Ok(Self { ride_service_url, request_timeout_secs, page_size, bearer_token })
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n as u64),
        _ => Err(ConfigError::NotANumber { key, value: raw.to_string() }),
    }
}

pub struct AppState {
    pub ride_service: Arc<dyn RideOperations>,
    pub accounts: Arc<dyn AccountOperations>,
    pub cache: Arc<QueryCache>,
    pub notifier: Arc<dyn Notifier>,
    pub coordinator: Arc<RideCoordinator>,
    pub config: AppConfig,
}

impl AppState {
    /// Wire the coordinator against the remote Ride Service.
    pub fn new(config: AppConfig) -> RideResult<Self> {
        let service = Arc::new(HttpRideService::new(&config)?);
        tracing::info!("Using Ride Service at {}", config.ride_service_url);
        Ok(Self::with_service(config, service))
    }

    /// Wire the coordinator against an in-process Ride Service.
    pub fn in_memory() -> (Self, Arc<InMemoryRideService>) {
        let service = Arc::new(InMemoryRideService::new());
        let state = Self::with_service(AppConfig::default(), service.clone());
        (state, service)
    }

    pub fn with_service<S>(config: AppConfig, service: Arc<S>) -> Self
    where
        S: RideOperations + AccountOperations + 'static,
    {
        let ride_service: Arc<dyn RideOperations> = service.clone();
        let accounts: Arc<dyn AccountOperations> = service;
        let cache = Arc::new(QueryCache::new(CacheConfig::default()));
        let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
        let coordinator = Arc::new(RideCoordinator::new(
            ride_service.clone(),
            accounts.clone(),
            cache.clone(),
            notifier.clone(),
        ));

        Self { ride_service, accounts, cache, notifier, coordinator, config }
    }
}
