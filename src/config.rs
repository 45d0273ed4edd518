use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub stripe: StripeConfig,
    #[serde(default)]
    pub reservation: ReservationConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expires_in: i64,  // seconds
    pub refresh_token_expires_in: i64, // seconds
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// 默认结算币种 (ISO 4217 小写)
    #[serde(default = "default_currency")]
    pub currency: String,
}

/// 号码预留策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationConfig {
    /// pending 参与记录的保留时长（分钟），超时后号码释放
    #[serde(default = "default_hold_minutes")]
    pub hold_minutes: i64,
    /// 后台清理任务间隔（秒），0 表示不启动
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// 单次参与最多可选号码数
    #[serde(default = "default_max_elements")]
    pub max_elements_per_participation: usize,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            hold_minutes: default_hold_minutes(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_elements_per_participation: default_max_elements(),
        }
    }
}

impl ReservationConfig {
    pub fn hold_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.hold_minutes.max(0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_currency() -> String {
    "eur".to_string()
}

fn default_hold_minutes() -> i64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_elements() -> usize {
    100
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::from_toml_str(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Self::from_env_defaults()?,
            Err(e) => {
                return Err(format!("Cannot read config file {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        toml::from_str(config_str).map_err(|e| format!("Failed to parse config file: {e}").into())
    }

    fn from_env_defaults() -> Result<Self, Box<dyn std::error::Error>> {
        // 数据库 URL 在无配置文件时必须提供
        let database_url = get_env("DATABASE_URL")
            .ok_or("DATABASE_URL is not set and no config.toml was found")?;

        Ok(Config {
            server: ServerConfig {
                host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: get_env_parse("SERVER_PORT", 8080u16),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET").unwrap_or_else(|| "change-me-in-production".to_string()),
                access_token_expires_in: get_env_parse("JWT_ACCESS_EXPIRES_IN", 7200i64),
                refresh_token_expires_in: get_env_parse("JWT_REFRESH_EXPIRES_IN", 2_592_000i64),
            },
            stripe: StripeConfig {
                secret_key: get_env("STRIPE_SECRET_KEY").unwrap_or_default(),
                webhook_secret: get_env("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
                currency: get_env("STRIPE_CURRENCY").unwrap_or_else(default_currency),
            },
            reservation: ReservationConfig::default(),
            notifications: NotificationConfig::default(),
            admin: AdminConfig::default(),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = get_env("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(p) = get_env("SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = p;
        }
        if let Some(v) = get_env("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(mc) = get_env("DB_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.database.max_connections = mc;
        }
        if let Some(v) = get_env("JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Some(n) = get_env("JWT_ACCESS_EXPIRES_IN").and_then(|v| v.parse().ok()) {
            self.jwt.access_token_expires_in = n;
        }
        if let Some(n) = get_env("JWT_REFRESH_EXPIRES_IN").and_then(|v| v.parse().ok()) {
            self.jwt.refresh_token_expires_in = n;
        }
        if let Some(v) = get_env("STRIPE_SECRET_KEY") {
            self.stripe.secret_key = v;
        }
        if let Some(v) = get_env("STRIPE_WEBHOOK_SECRET") {
            self.stripe.webhook_secret = v;
        }
        if let Some(v) = get_env("STRIPE_CURRENCY") {
            self.stripe.currency = v.to_ascii_lowercase();
        }

        // 预留策略
        if let Some(n) = get_env("RESERVATION_HOLD_MINUTES").and_then(|v| v.parse().ok()) {
            self.reservation.hold_minutes = n;
        }
        if let Some(n) = get_env("RESERVATION_SWEEP_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.reservation.sweep_interval_secs = n;
        }
        if let Some(n) = get_env("RESERVATION_MAX_ELEMENTS").and_then(|v| v.parse().ok()) {
            self.reservation.max_elements_per_participation = n;
        }

        if let Some(v) = get_env("NOTIFICATION_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(v);
        }
        if let Some(v) = get_env("ADMIN_EMAIL") {
            self.admin.email = Some(v);
        }
        if let Some(v) = get_env("ADMIN_PASSWORD") {
            self.admin.password = Some(v);
        }
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_toml_uses_defaults() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [database]
            url = "postgres://localhost/sorteohub"
            max_connections = 5

            [jwt]
            secret = "s3cret"
            access_token_expires_in = 3600
            refresh_token_expires_in = 86400

            [stripe]
            secret_key = "sk_test_123"
            webhook_secret = "whsec_123"
        "#;

        let config = Config::from_toml_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.stripe.currency, "eur");
        assert_eq!(config.reservation.hold_minutes, 30);
        assert_eq!(config.reservation.max_elements_per_participation, 100);
        assert!(config.notifications.webhook_url.is_none());
        assert!(config.admin.email.is_none());
    }

    #[test]
    fn test_parse_reservation_section() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 8080

            [database]
            url = "postgres://localhost/sorteohub"
            max_connections = 10

            [jwt]
            secret = "s3cret"
            access_token_expires_in = 3600
            refresh_token_expires_in = 86400

            [stripe]
            secret_key = "sk_test_123"
            webhook_secret = "whsec_123"
            currency = "mxn"

            [reservation]
            hold_minutes = 15
            sweep_interval_secs = 0
        "#;

        let config = Config::from_toml_str(toml_str).unwrap();
        assert_eq!(config.stripe.currency, "mxn");
        assert_eq!(config.reservation.hold_minutes, 15);
        assert_eq!(config.reservation.hold_duration(), chrono::Duration::minutes(15));
        assert_eq!(config.reservation.sweep_interval_secs, 0);
        assert_eq!(config.reservation.max_elements_per_participation, 100);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(Config::from_toml_str("[server]\nport = \"abc\"").is_err());
    }
}
