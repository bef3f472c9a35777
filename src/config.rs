use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    pub base_url: String,
    pub dev_mode: bool,
    /// Receiving PromptPay account (phone, tax id or e-wallet id)
    pub promptpay_id: String,
    pub payment_ttl_minutes: i64,
    pub amount_salt_enabled: bool,
    /// Largest single funding amount, in baht
    pub max_funding_amount: i64,
    pub payment_webhook_secret: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub upload_dir: String,
    pub max_slip_bytes: usize,
    pub expiry_sweep_secs: u64,
    /// Enable/disable audit logging entirely
    pub audit_log_enabled: bool,
    /// Days to retain audit logs before purging (0 = never purge)
    pub audit_log_retention_days: i64,
    pub session_ttl_hours: i64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v != "false" && v != "0")
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("SCRIPTSHOP_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env_parse("PORT", 3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "scriptshop.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "scriptshop_audit.db".to_string()),
            base_url,
            dev_mode,
            promptpay_id: env::var("PROMPTPAY_ID").unwrap_or_default(),
            payment_ttl_minutes: env_parse("PAYMENT_TTL_MINUTES", 15),
            amount_salt_enabled: env_flag("AMOUNT_SALT_ENABLED", true),
            max_funding_amount: env_parse("MAX_FUNDING_AMOUNT", 100_000),
            payment_webhook_secret: env_opt("PAYMENT_WEBHOOK_SECRET"),
            discord_webhook_url: env_opt("DISCORD_WEBHOOK_URL"),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads/slips".to_string()),
            max_slip_bytes: env_parse("MAX_SLIP_BYTES", 5 * 1024 * 1024),
            expiry_sweep_secs: env_parse("EXPIRY_SWEEP_SECS", 60),
            audit_log_enabled: env_flag("AUDIT_LOG_ENABLED", true),
            audit_log_retention_days: env_parse("AUDIT_LOG_RETENTION_DAYS", 90),
            session_ttl_hours: env_parse("SESSION_TTL_HOURS", 24),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings that must be present before serving traffic.
    pub fn validate(&self) -> Result<(), String> {
        if self.promptpay_id.trim().is_empty() && !self.dev_mode {
            return Err("PROMPTPAY_ID must be set outside dev mode".into());
        }
        if self.payment_ttl_minutes <= 0 {
            return Err("PAYMENT_TTL_MINUTES must be positive".into());
        }
        if self.max_funding_amount < 1 {
            return Err("MAX_FUNDING_AMOUNT must be at least 1".into());
        }
        Ok(())
    }
}
