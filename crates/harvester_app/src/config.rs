//! Run configuration, read once from the environment at startup.

use std::path::PathBuf;
use std::time::Duration;

use harvester_engine::{
    Credentials, DecodeFailurePolicy, EngineConfig, MissingCheckpoint, ScanSettings, WaitSettings,
};
use thiserror::Error;
use url::Url;

pub const BROWSER_PROFILE: &str = "HARVEST_BROWSER_PROFILE";
pub const DRIVER_PATH: &str = "HARVEST_DRIVER_PATH";
pub const OUTPUT_DIR: &str = "HARVEST_OUTPUT_DIR";
pub const FEED_USER: &str = "HARVEST_FEED_USER";
pub const FEED_PASSWORD: &str = "HARVEST_FEED_PASSWORD";
pub const FEED_URL: &str = "HARVEST_FEED_URL";
pub const DRIVER_PORT: &str = "HARVEST_DRIVER_PORT";
pub const FIRST_RUN: &str = "HARVEST_FIRST_RUN";
pub const ON_DECODE_FAILURE: &str = "HARVEST_ON_DECODE_FAILURE";
pub const HEADLESS: &str = "HARVEST_HEADLESS";
pub const WAIT_TIMEOUT_SECS: &str = "HARVEST_WAIT_TIMEOUT_SECS";

const DEFAULT_DRIVER_PORT: u16 = 9515;
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub browser_profile: PathBuf,
    pub driver_path: PathBuf,
    pub output_dir: PathBuf,
    pub credentials: Credentials,
    pub feed_url: Url,
    pub driver_port: u16,
    pub first_run: bool,
    pub on_decode_failure: DecodeFailurePolicy,
    pub headless: bool,
    pub wait_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let browser_profile = PathBuf::from(required(BROWSER_PROFILE)?);
        let driver_path = PathBuf::from(required(DRIVER_PATH)?);
        let output_dir = PathBuf::from(required(OUTPUT_DIR)?);
        let user = required(FEED_USER)?;
        // Passwords may legitimately start or end with spaces.
        let password = lookup(FEED_PASSWORD)
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing(FEED_PASSWORD))?;
        let feed_url = parse_feed_url(&required(FEED_URL)?)?;

        let driver_port = match get(DRIVER_PORT) {
            Some(value) => value.parse().map_err(|err: std::num::ParseIntError| {
                invalid(DRIVER_PORT, &value, err.to_string())
            })?,
            None => DEFAULT_DRIVER_PORT,
        };
        let on_decode_failure = match get(ON_DECODE_FAILURE).as_deref() {
            None | Some("abort") => DecodeFailurePolicy::Abort,
            Some("skip") => DecodeFailurePolicy::SkipAttachment,
            Some(other) => {
                return Err(invalid(ON_DECODE_FAILURE, other, "expected `abort` or `skip`"))
            }
        };
        let wait_secs = match get(WAIT_TIMEOUT_SECS) {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(invalid(
                        WAIT_TIMEOUT_SECS,
                        &value,
                        "expected a positive number of seconds",
                    ))
                }
            },
            None => DEFAULT_WAIT_TIMEOUT_SECS,
        };

        Ok(Self {
            browser_profile,
            driver_path,
            output_dir,
            credentials: Credentials::new(user, password),
            feed_url,
            driver_port,
            first_run: flag(get(FIRST_RUN), FIRST_RUN)?,
            on_decode_failure,
            headless: flag(get(HEADLESS), HEADLESS)?,
            wait_timeout: Duration::from_secs(wait_secs),
        })
    }

    pub fn wait_settings(&self) -> WaitSettings {
        WaitSettings::with_timeout(self.wait_timeout)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(
            self.output_dir.clone(),
            self.feed_url.as_str(),
            self.credentials.clone(),
        );
        config.wait = self.wait_settings();
        config.scan = ScanSettings {
            load_wait: self.wait_settings(),
            ..ScanSettings::default()
        };
        config.on_decode_failure = self.on_decode_failure;
        config.on_missing_checkpoint = if self.first_run {
            MissingCheckpoint::StartFromZero
        } else {
            MissingCheckpoint::Fail
        };
        config
    }
}

fn parse_feed_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|err| invalid(FEED_URL, value, err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(invalid(FEED_URL, value, format!("unsupported scheme `{scheme}`"))),
    }
}

fn flag(value: Option<String>, name: &'static str) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(invalid(name, other, "expected 1/true or 0/false")),
    }
}

fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.into(),
    }
}
