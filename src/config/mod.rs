use std::env;

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub listen_addr: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub documents_dir: String,
    pub receipts_dir: String,
    pub lease_sweep_schedule: String,
    pub payment_cancel_grace_hours: i64,
    pub currency: String,
    pub admin_email: String,
    pub admin_password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "/data/rental-hub.db".to_string(),
            db_max_connections: 5,
            listen_addr: "0.0.0.0:8080".to_string(),
            jwt_secret: String::new(),
            jwt_ttl_hours: 24,
            documents_dir: "/data/documents".to_string(),
            receipts_dir: "/data/receipts".to_string(),
            lease_sweep_schedule: "0 2 * * *".to_string(),
            payment_cancel_grace_hours: 48,
            currency: "MAD".to_string(),
            admin_email: "admin@rental-hub.local".to_string(),
            admin_password: "Admin@123".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env`) with defaults
    pub fn load() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        let d = Self::default();
        Self {
            db_path: get_env("DB_PATH", &d.db_path),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", d.db_max_connections),
            listen_addr: get_env("LISTEN_ADDR", &d.listen_addr),
            jwt_secret: get_env("JWT_SECRET", ""),
            jwt_ttl_hours: parse_env("JWT_TTL_HOURS", d.jwt_ttl_hours),
            documents_dir: get_env("DOCUMENTS_DIR", &d.documents_dir),
            receipts_dir: get_env("RECEIPTS_DIR", &d.receipts_dir),
            lease_sweep_schedule: get_env("LEASE_SWEEP_SCHEDULE", &d.lease_sweep_schedule),
            payment_cancel_grace_hours: parse_env("PAYMENT_CANCEL_GRACE_HOURS", d.payment_cancel_grace_hours),
            currency: get_env("CURRENCY", &d.currency),
            admin_email: get_env("ADMIN_EMAIL", &d.admin_email),
            admin_password: get_env("ADMIN_PASSWORD", &d.admin_password),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.db_max_connections, 5);
        assert_eq!(cfg.lease_sweep_schedule, "0 2 * * *");
        assert_eq!(cfg.payment_cancel_grace_hours, 48);
        assert_eq!(cfg.currency, "MAD");
        assert!(cfg.jwt_secret.is_empty());
    }

    #[test]
    fn test_parse_env_falls_back() {
        env::set_var("RENTAL_HUB_TEST_GRACE", "not-a-number");
        assert_eq!(parse_env("RENTAL_HUB_TEST_GRACE", 48i64), 48);
        env::set_var("RENTAL_HUB_TEST_GRACE", " 12 ");
        assert_eq!(parse_env("RENTAL_HUB_TEST_GRACE", 48i64), 12);
        env::remove_var("RENTAL_HUB_TEST_GRACE");
        assert_eq!(parse_env("RENTAL_HUB_TEST_GRACE", 48i64), 48);
    }
}
