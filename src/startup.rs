use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub payment_gateway: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.payment_gateway
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Payment Gateway:       {}", status(self.payment_gateway));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!(
            "\nOverall Status: {}",
            if self.is_valid() { "✅ PASS" } else { "❌ FAIL" }
        );
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        payment_gateway: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = validate_payment_gateway(config).await {
        report.payment_gateway = false;
        report.errors.push(format!("Payment gateway: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.jwt_secret.len() < 16 {
        anyhow::bail!("JWT_SECRET must be at least 16 characters");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.worker_interval_secs == 0 {
        anyhow::bail!("WORKER_INTERVAL must be greater than 0");
    }

    url::Url::parse(&config.payment_api_url).context("PAYMENT_API_URL is not a valid URL")?;

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

/// Any HTTP answer counts as reachable; only connection failures fail the check.
async fn validate_payment_gateway(config: &Config) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client
        .get(&config.payment_api_url)
        .send()
        .await
        .context("Failed to connect to payment provider")?;

    if response.status().is_server_error() {
        anyhow::bail!("Payment provider returned status: {}", response.status());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;

    fn config() -> Config {
        Config {
            server_port: 8080,
            database_url: "postgres://localhost:5432/expenses".to_string(),
            database_max_connections: 5,
            jwt_secret: "a-sufficiently-long-secret".to_string(),
            payment_api_url: "https://pay.example.com".to_string(),
            payment_timeout_secs: 30,
            worker_interval_secs: 30,
            cors_allowed_origins: None,
            log_format: LogFormat::Pretty,
        }
    }

    #[test]
    fn test_validate_env_vars_accepts_sane_config() {
        assert!(validate_env_vars(&config()).is_ok());
    }

    #[test]
    fn test_validate_env_vars_empty_database_url() {
        let config = Config {
            database_url: String::new(),
            ..config()
        };
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_invalid_url() {
        let config = Config {
            payment_api_url: "not-a-url".to_string(),
            ..config()
        };
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_short_secret() {
        let config = Config {
            jwt_secret: "short".to_string(),
            ..config()
        };
        assert!(validate_env_vars(&config).is_err());
    }
}
