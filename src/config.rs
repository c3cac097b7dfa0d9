use chrono::NaiveDate;
use std::env;

/// Runtime configuration, read once at startup. The semester window bounds
/// how far rescheduling may reach; nothing in the handlers hard-codes dates.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub semester_start: NaiveDate,
    pub semester_end: NaiveDate,
    pub jwt_secret: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let semester_start = parse_date_var("SEMESTER_START", "2024-08-26")?;
        let semester_end = parse_date_var("SEMESTER_END", "2025-12-05")?;
        if semester_end <= semester_start {
            anyhow::bail!("SEMESTER_END must be after SEMESTER_START");
        }
        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
        Ok(Self {
            semester_start,
            semester_end,
            jwt_secret,
        })
    }
}

fn parse_date_var(name: &str, default: &str) -> anyhow::Result<NaiveDate> {
    let raw = env::var(name).unwrap_or_else(|_| default.into());
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("{name} must be YYYY-MM-DD: {e}"))
}
