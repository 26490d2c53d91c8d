//! Server configuration loaded from the environment

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub run_migrations: bool,

    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,

    /// Report workflow endpoint and its bearer credential
    pub workflow_url: String,
    pub workflow_api_key: String,
    pub workflow_timeout: Duration,

    /// Chat widget token issuance; the endpoint is disabled when any is unset
    pub chat_token_url: Option<String>,
    pub chat_api_key: Option<String>,
    pub chat_bot_id: Option<String>,

    /// Base URL of the web app, used for upgrade links
    pub public_app_url: String,
    pub allowed_origins: Vec<String>,

    /// Unfinished reports untouched for this long are considered abandoned
    pub stale_report_after: Duration,
    pub max_report_attempts: i32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            database_url: required("DATABASE_URL")?,
            bind_address: optional("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            run_migrations: parse_or("RUN_MIGRATIONS", true)?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiry_hours: parse_or("JWT_EXPIRY_HOURS", 24)?,
            workflow_url: required("WORKFLOW_URL")?,
            workflow_api_key: required("WORKFLOW_API_KEY")?,
            workflow_timeout: Duration::from_secs(parse_or("WORKFLOW_TIMEOUT_SECS", 300)?),
            chat_token_url: optional("CHAT_TOKEN_URL"),
            chat_api_key: optional("CHAT_API_KEY"),
            chat_bot_id: optional("CHAT_BOT_ID"),
            public_app_url: optional("PUBLIC_APP_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            allowed_origins: optional("ALLOWED_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000,http://127.0.0.1:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            stale_report_after: Duration::from_secs(parse_or("STALE_REPORT_SECS", 900)?),
            max_report_attempts: parse_or("MAX_REPORT_ATTEMPTS", 3)?,
        };

        // Recovery must not claim a report whose runner is still waiting on the workflow
        if config.stale_report_after <= config.workflow_timeout {
            return Err(ConfigError::Invalid {
                var: "STALE_REPORT_SECS",
                value: config.stale_report_after.as_secs().to_string(),
            });
        }

        Ok(config)
    }

    /// Where users are sent to change plan
    pub fn upgrade_url(&self) -> String {
        format!("{}/pricing", self.public_app_url)
    }
}

fn optional(var: &'static str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::Missing(var))
}

fn parse_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(var) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: &[&str] = &[
        "DATABASE_URL",
        "BIND_ADDRESS",
        "RUN_MIGRATIONS",
        "JWT_SECRET",
        "JWT_EXPIRY_HOURS",
        "WORKFLOW_URL",
        "WORKFLOW_API_KEY",
        "WORKFLOW_TIMEOUT_SECS",
        "CHAT_TOKEN_URL",
        "CHAT_API_KEY",
        "CHAT_BOT_ID",
        "PUBLIC_APP_URL",
        "ALLOWED_ORIGINS",
        "STALE_REPORT_SECS",
        "MAX_REPORT_ATTEMPTS",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }

    fn set_required() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/bizreport");
        std::env::set_var("JWT_SECRET", "test-secret");
        std::env::set_var("WORKFLOW_URL", "https://workflow.example.com/run");
        std::env::set_var("WORKFLOW_API_KEY", "wf-key");
    }

    #[test]
    #[serial]
    fn test_defaults_applied() {
        clear_env();
        set_required();

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert!(config.run_migrations);
        assert_eq!(config.workflow_timeout, Duration::from_secs(300));
        assert_eq!(config.stale_report_after, Duration::from_secs(900));
        assert_eq!(config.max_report_attempts, 3);
        assert_eq!(config.upgrade_url(), "http://localhost:3000/pricing");
        assert!(config.chat_token_url.is_none());
        assert_eq!(config.allowed_origins.len(), 2);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_required_variable() {
        clear_env();
        set_required();
        std::env::remove_var("WORKFLOW_API_KEY");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("WORKFLOW_API_KEY")));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_number_is_rejected() {
        clear_env();
        set_required();
        std::env::set_var("WORKFLOW_TIMEOUT_SECS", "soon");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "WORKFLOW_TIMEOUT_SECS",
                ..
            }
        ));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_stale_threshold_must_exceed_workflow_timeout() {
        clear_env();
        set_required();
        std::env::set_var("WORKFLOW_TIMEOUT_SECS", "600");
        std::env::set_var("STALE_REPORT_SECS", "600");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "STALE_REPORT_SECS",
                ..
            }
        ));

        std::env::set_var("STALE_REPORT_SECS", "601");
        let config = Config::from_env().unwrap();
        assert_eq!(config.stale_report_after, Duration::from_secs(601));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_overrides_and_trailing_slash() {
        clear_env();
        set_required();
        std::env::set_var("PUBLIC_APP_URL", "https://app.bizreport.io/");
        std::env::set_var("WORKFLOW_TIMEOUT_SECS", "30");
        std::env::set_var("ALLOWED_ORIGINS", "https://app.bizreport.io, ");
        std::env::set_var("RUN_MIGRATIONS", "false");

        let config = Config::from_env().unwrap();
        assert_eq!(config.upgrade_url(), "https://app.bizreport.io/pricing");
        assert_eq!(config.workflow_timeout, Duration::from_secs(30));
        assert_eq!(config.allowed_origins, vec!["https://app.bizreport.io"]);
        assert!(!config.run_migrations);

        clear_env();
    }
}
