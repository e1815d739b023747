use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub db_max_connections: u32,
    pub max_generation_days: i64,
    pub run_migrations: bool,
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn flag_or(key: &str, default: bool) -> anyhow::Result<bool> {
    match env::var(key) {
        Ok(raw) => parse_flag(&raw).ok_or_else(|| {
            anyhow::anyhow!("{key} must be one of 1/0, true/false, yes/no, on/off")
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        let max_generation_days = parsed_or("MAX_GENERATION_DAYS", 366i64)?;
        if max_generation_days < 1 {
            anyhow::bail!("MAX_GENERATION_DAYS must be at least 1");
        }

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours: parsed_or("SESSION_TTL_HOURS", 24)?,
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 10)?,
            max_generation_days,
            run_migrations: flag_or("RUN_MIGRATIONS", true)?,
        })
    }
}
