//! Gateway configuration, read from the environment at startup.

use crate::error::AppError;

/// Which event repository backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStoreBackend {
    /// In-memory repository; state is lost on restart.
    Memory,
    /// PostgreSQL repository; requires `DATABASE_URL`.
    Postgres,
}

/// Typed gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Event repository backend.
    pub backend: EventStoreBackend,
    /// PostgreSQL connection string; required for the postgres backend.
    pub database_url: Option<String>,
    /// Worker count used for queue wait estimates.
    pub workers_available: u32,
    /// Whether clients may replay raw event history.
    pub enable_event_history: bool,
}

impl GatewayConfig {
    /// Reads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// [`AppError::Config`] when a variable fails to parse or the postgres
    /// backend is selected without `DATABASE_URL`.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through a variable lookup, so tests can supply
    /// values without touching the process environment.
    ///
    /// # Errors
    ///
    /// See [`GatewayConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned());
        let port: u16 = lookup("PORT")
            .unwrap_or_else(|| "3000".to_owned())
            .parse()
            .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?;

        let backend = match lookup("EVENT_STORE").as_deref() {
            None | Some("memory") => EventStoreBackend::Memory,
            Some("postgres") => EventStoreBackend::Postgres,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "EVENT_STORE must be 'memory' or 'postgres', got '{other}'"
                )));
            }
        };

        let database_url = lookup("DATABASE_URL");
        if backend == EventStoreBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config(
                "DATABASE_URL must be set when EVENT_STORE=postgres".to_owned(),
            ));
        }

        let workers_available: u32 = lookup("WORKERS_AVAILABLE")
            .unwrap_or_else(|| "1".to_owned())
            .parse()
            .map_err(|e| AppError::Config(format!("WORKERS_AVAILABLE must be a valid u32: {e}")))?;
        if workers_available == 0 {
            return Err(AppError::Config(
                "WORKERS_AVAILABLE must be at least 1".to_owned(),
            ));
        }

        let enable_event_history = match lookup("ENABLE_EVENT_HISTORY").as_deref() {
            None | Some("false" | "0") => false,
            Some("true" | "1") => true,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "ENABLE_EVENT_HISTORY must be 'true' or 'false', got '{other}'"
                )));
            }
        };

        Ok(Self {
            host,
            port,
            backend,
            database_url,
            workers_available,
            enable_event_history,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_select_memory_backend() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.backend, EventStoreBackend::Memory);
        assert_eq!(config.workers_available, 1);
        assert!(!config.enable_event_history);
    }

    #[test]
    fn test_postgres_backend_requires_database_url() {
        let result = GatewayConfig::from_lookup(lookup(&[("EVENT_STORE", "postgres")]));
        assert!(matches!(result.unwrap_err(), AppError::Config(_)));

        let config = GatewayConfig::from_lookup(lookup(&[
            ("EVENT_STORE", "postgres"),
            ("DATABASE_URL", "postgres://localhost/artifex"),
        ]))
        .unwrap();
        assert_eq!(config.backend, EventStoreBackend::Postgres);
    }

    #[test]
    fn test_invalid_port_is_a_config_error() {
        let result = GatewayConfig::from_lookup(lookup(&[("PORT", "not-a-port")]));
        assert!(matches!(result.unwrap_err(), AppError::Config(_)));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let result = GatewayConfig::from_lookup(lookup(&[("WORKERS_AVAILABLE", "0")]));
        assert!(matches!(result.unwrap_err(), AppError::Config(_)));
    }

    #[test]
    fn test_event_history_flag_parses_true() {
        let config =
            GatewayConfig::from_lookup(lookup(&[("ENABLE_EVENT_HISTORY", "true")])).unwrap();
        assert!(config.enable_event_history);
    }
}
