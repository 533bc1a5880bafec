use std::path::PathBuf;

use crate::error::{AppError, Result};

pub const API_BASE_URL: &str = "https://api.rec.us/v1";
pub const BOOKING_BASE_URL: &str = "https://www.rec.us/locations";

/// Rolling horizon of dates checked each cycle.
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Poll interval (seconds). Every 10 minutes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 600;

/// Per-request timeout against the upstream schedule API (seconds).
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Upstream marker for a slot that can currently be booked.
pub const RESERVABLE: &str = "RESERVABLE";

/// Channel capacity for cycle reports headed to the ledger writer.
pub const CHANNEL_CAPACITY: usize = 64;

/// Submission port. Anything else is treated as implicit TLS (465).
pub const SMTP_STARTTLS_PORT: u16 = 587;

pub const MAIL_SUBJECT: &str = "🎯 New Booking Slot(s) Available at REC!";

/// How two snapshots are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    /// Canonical serialization must match byte for byte. Reordering is a change.
    Strict,
    /// Set comparison keyed by (date, court, time). Alerts list added slots only.
    Added,
}

impl std::str::FromStr for CompareMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(CompareMode::Strict),
            "added" => Ok(CompareMode::Added),
            other => Err(AppError::Config(format!(
                "COMPARE_MODE must be 'strict' or 'added', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for CompareMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareMode::Strict => write!(f, "strict"),
            CompareMode::Added => write!(f, "added"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    File,
}

impl std::str::FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "file" => Ok(StoreBackend::File),
            other => Err(AppError::Config(format!(
                "STORE_BACKEND must be 'sqlite' or 'file', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    /// Venue identifier on rec.us (LOCATION_ID)
    pub location_id: String,
    pub window_days: u32,
    pub poll_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub compare_mode: CompareMode,
    pub store_backend: StoreBackend,
    pub db_path: String,
    pub snapshot_file: PathBuf,
    pub mail: MailConfig,
    /// Log outgoing mail instead of sending it (DRY_RUN)
    pub dry_run: bool,
    /// 0 disables the status API
    pub api_port: u16,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Required keys are checked together so
    /// a misconfigured deployment reports everything missing in one go.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let dry_run = get("DRY_RUN")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let mut required = vec!["LOCATION_ID"];
        if !dry_run {
            required.extend(["EMAIL_USER", "EMAIL_PASS", "EMAIL_TO"]);
        }
        let missing: Vec<&str> = required.into_iter().filter(|&k| get(k).is_none()).collect();
        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let username = get("EMAIL_USER").unwrap_or_default();
        let from = get("EMAIL_FROM").unwrap_or_else(|| username.clone());
        let to: Vec<String> = get("EMAIL_TO")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let window_days = parse_or(get("WINDOW_DAYS"), "WINDOW_DAYS", DEFAULT_WINDOW_DAYS)?;
        if window_days == 0 {
            return Err(AppError::Config("WINDOW_DAYS must be at least 1".to_string()));
        }

        let poll_interval_secs = parse_or(
            get("POLL_INTERVAL_SECS"),
            "POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
        )?;
        let fetch_timeout_secs = parse_or(
            get("FETCH_TIMEOUT_SECS"),
            "FETCH_TIMEOUT_SECS",
            DEFAULT_FETCH_TIMEOUT_SECS,
        )?;
        if poll_interval_secs == 0 || fetch_timeout_secs == 0 {
            return Err(AppError::Config(
                "POLL_INTERVAL_SECS and FETCH_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        Ok(Self {
            api_base_url: get("API_BASE_URL")
                .unwrap_or_else(|| API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            location_id: get("LOCATION_ID").unwrap_or_default(),
            window_days,
            poll_interval_secs,
            fetch_timeout_secs,
            compare_mode: get("COMPARE_MODE")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(CompareMode::Strict),
            store_backend: get("STORE_BACKEND")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(StoreBackend::Sqlite),
            db_path: get("DB_PATH").unwrap_or_else(|| "slots.db".to_string()),
            snapshot_file: PathBuf::from(get("SNAPSHOT_FILE").unwrap_or_else(|| "slots.json".to_string())),
            mail: MailConfig {
                smtp_host: get("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                smtp_port: parse_or(get("SMTP_PORT"), "SMTP_PORT", 465)?,
                username,
                password: get("EMAIL_PASS").unwrap_or_default(),
                from,
                to,
            },
            dry_run,
            api_port: parse_or(get("API_PORT"), "API_PORT", 3000)?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Per-date schedule endpoint.
    pub fn schedule_url(&self, date: &str) -> String {
        format!(
            "{}/locations/{}/schedule?startDate={}",
            self.api_base_url, self.location_id, date
        )
    }

    pub fn booking_url(&self) -> String {
        format!("{}/{}?tab=book-now", BOOKING_BASE_URL, self.location_id)
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(v) => v
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: '{v}'"))),
        None => Ok(default),
    }
}
