// dbcapture/src/config/mod.rs
use serde::Deserialize;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::backup::tiers::TierPolicy;
use crate::errors::{BackupError, Result};

const DEFAULT_DUMP_PROGRAM: &str = "pg_dump";

// Structs for deserializing the optional JSON config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonTierConfig {
    pub hot_prefix: Option<String>,
    pub daily_prefix: Option<String>,
    pub monthly_prefix: Option<String>,
    pub daily_hour: Option<u32>,
    pub monthly_day: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub database_url: Option<String>,
    pub temp_dump_root: Option<PathBuf>,
    pub pg_dump_path: Option<String>,
    pub s3_storage: Option<JsonS3StorageConfig>,
    pub tiers: Option<JsonTierConfig>,
}

impl RawJsonConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            BackupError::io(
                format!("Failed to read config file at {}", config_path.display()),
                e,
            )
        })?;
        serde_json::from_str(&config_content).map_err(|e| {
            BackupError::Config(format!(
                "Failed to parse JSON from config file at {}: {}",
                config_path.display(),
                e
            ))
        })
    }
}

// Application's internal configuration structs
#[derive(Clone)]
pub struct SpacesConfig {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

impl fmt::Debug for SpacesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpacesConfig")
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

#[derive(Clone)]
pub struct CaptureConfig {
    pub database_url: String,
    pub temp_dump_root: Option<PathBuf>,
    pub dump_program: String,
    /// Directories searched for `dump_program`; `None` means the process PATH.
    pub dump_search_path: Option<OsString>,
    pub spaces: SpacesConfig,
    pub tiers: TierPolicy,
}

impl fmt::Debug for CaptureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureConfig")
            .field("database_url", &redact_url(&self.database_url))
            .field("temp_dump_root", &self.temp_dump_root)
            .field("dump_program", &self.dump_program)
            .field("dump_search_path", &self.dump_search_path)
            .field("spaces", &self.spaces)
            .field("tiers", &self.tiers)
            .finish()
    }
}

impl CaptureConfig {
    /// Loads `.env`, the optional JSON file, then the process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();
        let raw = match config_path {
            Some(path) => RawJsonConfig::load_from_json(path)?,
            None => RawJsonConfig::default(),
        };
        Self::resolve(raw, |key| std::env::var(key).ok())
    }

    /// Merges a parsed config file with environment lookups. Environment wins.
    pub fn resolve<F>(raw: RawJsonConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let s3_raw = raw.s3_storage.unwrap_or_default();
        let tiers_raw = raw.tiers.unwrap_or_default();

        let database_url = lookup("DATABASE_URL")
            .or(raw.database_url)
            .ok_or_else(|| missing("DATABASE_URL", "database_url"))?;

        let bucket_name = lookup("AWS_BUCKET")
            .or(s3_raw.bucket_name)
            .ok_or_else(|| missing("AWS_BUCKET", "s3_storage.bucket_name"))?;
        let region = lookup("AWS_REGION")
            .or(s3_raw.region)
            .ok_or_else(|| missing("AWS_REGION", "s3_storage.region"))?;
        let access_key_id = lookup("AWS_ACCESS_KEY_ID").or(s3_raw.access_key_id);
        let secret_access_key = lookup("AWS_SECRET_ACCESS_KEY").or(s3_raw.secret_access_key);
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(BackupError::Config(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".to_string(),
            ));
        }
        let force_path_style = match lookup("AWS_FORCE_PATH_STYLE") {
            Some(v) => parse_bool("AWS_FORCE_PATH_STYLE", &v)?,
            None => s3_raw.force_path_style.unwrap_or(false),
        };

        let defaults = TierPolicy::default();
        let daily_hour = match lookup("BACKUP_DAILY_HOUR") {
            Some(v) => parse_number("BACKUP_DAILY_HOUR", &v)?,
            None => tiers_raw.daily_hour.unwrap_or(defaults.daily_hour),
        };
        let monthly_day = match lookup("BACKUP_MONTHLY_DAY") {
            Some(v) => parse_number("BACKUP_MONTHLY_DAY", &v)?,
            None => tiers_raw.monthly_day.unwrap_or(defaults.monthly_day),
        };
        let tiers = TierPolicy {
            hot_prefix: lookup("BACKUP_HOT_PREFIX")
                .or(tiers_raw.hot_prefix)
                .unwrap_or(defaults.hot_prefix),
            daily_prefix: lookup("BACKUP_DAILY_PREFIX")
                .or(tiers_raw.daily_prefix)
                .unwrap_or(defaults.daily_prefix),
            monthly_prefix: lookup("BACKUP_MONTHLY_PREFIX")
                .or(tiers_raw.monthly_prefix)
                .unwrap_or(defaults.monthly_prefix),
            daily_hour,
            monthly_day,
        };
        tiers.validate()?;

        Ok(CaptureConfig {
            database_url,
            temp_dump_root: lookup("BACKUP_TEMP_ROOT")
                .map(PathBuf::from)
                .or(raw.temp_dump_root),
            dump_program: lookup("PG_DUMP_PATH")
                .or(raw.pg_dump_path)
                .unwrap_or_else(|| DEFAULT_DUMP_PROGRAM.to_string()),
            dump_search_path: None,
            spaces: SpacesConfig {
                bucket_name,
                region,
                access_key_id,
                secret_access_key,
                endpoint_url: lookup("AWS_ENDPOINT_URL").or(s3_raw.endpoint_url),
                force_path_style,
            },
            tiers,
        })
    }
}

fn missing(env_key: &str, json_key: &str) -> BackupError {
    BackupError::Config(format!(
        "{} must be set in the environment (or {} in the config file)",
        env_key, json_key
    ))
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| BackupError::Config(format!("{} is not a valid number: {}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(BackupError::Config(format!(
            "{} is not a valid boolean: {}",
            key, value
        ))),
    }
}

/// Masks the password of a connection string so it can be logged.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparsable url>".to_string(),
    }
}
