use crate::error::ConfigError;
use crate::notifications::DEFAULT_PAGE_SIZE;
use crate::poller::DEFAULT_OFFLINE_AFTER;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(10);

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub base_url: String,
    pub data_dir: PathBuf,
    pub page_size: u32,
    pub offline_after: Duration,
    pub request_timeout: Duration,
}

impl AppConfig {
    pub fn new(base_url: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            data_dir: data_dir.into(),
            page_size: DEFAULT_PAGE_SIZE,
            offline_after: DEFAULT_OFFLINE_AFTER,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn load(file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let from_file = match file {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };

        let mut config = Self::new(String::new(), default_data_dir());
        config.apply_file(from_file)?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if let Some(data_dir) = file.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(page_size) = file.page_size {
            self.page_size = page_size;
        }
        if let Some(raw) = file.offline_after.as_deref() {
            self.offline_after = parse_duration(raw).map_err(ConfigError::Invalid)?;
        }
        if let Some(raw) = file.request_timeout.as_deref() {
            self.request_timeout = parse_duration(raw).map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.base_url {
            self.base_url = base_url;
        }
        if let Some(data_dir) = overrides.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(page_size) = overrides.page_size {
            self.page_size = page_size;
        }
        if let Some(offline_after) = overrides.offline_after {
            self.offline_after = offline_after;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::Invalid(
                "base url is required (--base-url or COLDWATCH_BASE_URL)".to_string(),
            ));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base url '{base_url}' must start with http:// or https://"
            )));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid(
                "page size must be at least 1".to_string(),
            ));
        }
        if !self.offline_after.is_positive() {
            return Err(ConfigError::Invalid(
                "offline threshold must be greater than 0".to_string(),
            ));
        }
        if !self.request_timeout.is_positive() {
            return Err(ConfigError::Invalid(
                "request timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub page_size: Option<u32>,
    pub offline_after: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    data_dir: Option<PathBuf>,
    page_size: Option<u32>,
    offline_after: Option<String>,
    request_timeout: Option<String>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs_err::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("coldwatch"))
        .unwrap_or_else(|| PathBuf::from(".coldwatch"))
}

/// `<number>[s|m|h|d]`; a bare number is seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let (amount, unit) = match value.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => {
            (&value[..value.len() - 1], ch.to_ascii_lowercase())
        }
        _ => (value, 's'),
    };

    let amount: i64 = amount
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{value}'; expected <number>[s|m|h|d]"))?;

    if amount <= 0 {
        return Err(format!("duration '{value}' must be greater than 0"));
    }

    match unit {
        's' => Ok(Duration::seconds(amount)),
        'm' => Ok(Duration::minutes(amount)),
        'h' => Ok(Duration::hours(amount)),
        'd' => Ok(Duration::days(amount)),
        _ => Err(format!(
            "invalid duration '{value}'; expected <number>[s|m|h|d]"
        )),
    }
}
