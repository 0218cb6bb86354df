use std::sync::OnceLock;

use crate::errors::AppError;
use crate::jwt::JwtConfig;

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";

/// Runtime environment, read once from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Error responses carry a `detail` field with the debug rendering
    Development,
    Production,
}

impl Environment {
    pub fn current() -> Self {
        static ENV: OnceLock<Environment> = OnceLock::new();
        *ENV.get_or_init(|| Self::parse(&std::env::var("APP_ENV").unwrap_or_default()))
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            _ => Environment::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Settings the HTTP application needs, loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub environment: Environment,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn new(jwt: JwtConfig) -> Self {
        Self {
            port: DEFAULT_PORT,
            cors_origins: vec![DEFAULT_FRONTEND_URL.to_string()],
            environment: Environment::current(),
            jwt,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let jwt = JwtConfig::from_env()?;

        let port = match std::env::var("APP_PORT") {
            Ok(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            Err(_) => DEFAULT_PORT,
        };

        let cors_origins = parse_origins(
            &std::env::var("FRONTEND_URL").unwrap_or_else(|_| DEFAULT_FRONTEND_URL.to_string()),
        );

        Ok(Self {
            port,
            cors_origins,
            environment: Environment::current(),
            jwt,
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_cors_origins(mut self, origins: impl IntoIterator<Item = String>) -> Self {
        self.cors_origins = origins.into_iter().collect();
        self
    }
}

/// Splits a comma-separated origin list, dropping blanks and trailing slashes.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_split_and_trimmed() {
        let origins = parse_origins(" http://localhost:3000/, https://app.example.com ,,");
        assert_eq!(origins, vec!["http://localhost:3000", "https://app.example.com"]);
    }

    #[test]
    fn environment_defaults_to_production() {
        assert_eq!(Environment::parse(""), Environment::Production);
        assert_eq!(Environment::parse("staging"), Environment::Production);
        assert_eq!(Environment::parse("Development"), Environment::Development);
        assert!(Environment::parse("dev").is_development());
    }
}
