//! Gateway startup and runtime errors.

use thiserror::Error;

/// Startup and runtime errors for the gateway server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_names_the_problem() {
        let err = AppError::Config("PORT must be a valid u16".to_owned());
        assert_eq!(err.to_string(), "configuration error: PORT must be a valid u16");
    }

    #[test]
    fn test_io_errors_convert_into_server_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port busy");
        let err = AppError::from(io);
        assert!(matches!(err, AppError::Server(_)));
        assert!(err.to_string().contains("port busy"));
    }
}
