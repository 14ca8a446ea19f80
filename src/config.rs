use std::{env, ops::RangeInclusive, path::PathBuf, str::FromStr};
use tracing::warn;

const DEV_QR_SECRET: &str = "academy-dev-qr-secret";
const WEB_SESSION_HOURS: RangeInclusive<i64> = 1..=24 * 30;
const MOBILE_SESSION_DAYS: RangeInclusive<i64> = 1..=365;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub qr_secret: String,
    pub web_session_hours: i64,
    pub mobile_session_days: i64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("data/academy.sqlite3"),
            qr_secret: DEV_QR_SECRET.to_string(),
            web_session_hours: 12,
            mobile_session_days: 30,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let qr_secret = match lookup("APP_QR_SECRET").filter(|v| !v.trim().is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("APP_QR_SECRET not set, using the development secret");
                defaults.qr_secret
            }
        };

        Self {
            port: parse_or(&lookup, "PORT", defaults.port),
            db_path: lookup("APP_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            qr_secret,
            web_session_hours: parse_within(
                &lookup,
                "APP_WEB_SESSION_HOURS",
                defaults.web_session_hours,
                WEB_SESSION_HOURS,
            ),
            mobile_session_days: parse_within(
                &lookup,
                "APP_MOBILE_SESSION_DAYS",
                defaults.mobile_session_days,
                MOBILE_SESSION_DAYS,
            ),
            admin_email: lookup("APP_ADMIN_EMAIL").filter(|v| !v.trim().is_empty()),
            admin_password: lookup("APP_ADMIN_PASSWORD").filter(|v| !v.is_empty()),
        }
    }
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {key}={raw}");
            default
        }),
        None => default,
    }
}

fn parse_within(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: i64,
    allowed: RangeInclusive<i64>,
) -> i64 {
    let value = parse_or(lookup, key, default);
    if allowed.contains(&value) {
        value
    } else {
        warn!(
            "ignoring {key}={value}, expected {}..={}",
            allowed.start(),
            allowed.end()
        );
        default
    }
}
