use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::http::{HttpError, ValidatedUrl};
use crate::restore::RetryPolicy;
use crate::{AppError, ErrorKind, DEFAULT_CASES_PER_PAGE, MAX_CASES_PER_PAGE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid Formplayer URL: {0}")]
    FormplayerUrl(#[from] HttpError),
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("cases per page must be between 1 and {max}, got {value}")]
    CasesPerPage { value: u32, max: u32 },
    #[error("retry delays are inverted: default {default_ms}ms exceeds max {max_ms}ms")]
    RetryDelays { default_ms: u64, max_ms: u64 },
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Configuration, e.to_string())
    }
}

/// Identity and endpoint settings handed over by the hosting page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub formplayer_url: String,
    pub domain: String,
    pub username: String,
    pub restore_as: Option<String>,
    pub default_cases_per_page: u32,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            formplayer_url: String::new(),
            domain: String::new(),
            username: String::new(),
            restore_as: None,
            default_cases_per_page: DEFAULT_CASES_PER_PAGE,
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new(
        formplayer_url: impl Into<String>,
        domain: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            formplayer_url: formplayer_url.into(),
            domain: domain.into(),
            username: username.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_restore_as(mut self, restore_as: impl Into<String>) -> Self {
        self.restore_as = Some(restore_as.into());
        self
    }

    #[must_use]
    pub fn with_cases_per_page(mut self, cases_per_page: u32) -> Self {
        self.default_cases_per_page = cases_per_page;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<ValidatedUrl, ConfigError> {
        let url = ValidatedUrl::new(&self.formplayer_url)?;

        if self.domain.trim().is_empty() {
            return Err(ConfigError::Empty { field: "domain" });
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::Empty { field: "username" });
        }
        validate_cases_per_page(self.default_cases_per_page)?;

        let default_ms = self.retry.default_delay_ms;
        let max_ms = self.retry.max_delay_ms;
        if default_ms > max_ms {
            return Err(ConfigError::RetryDelays { default_ms, max_ms });
        }

        Ok(url)
    }
}

pub fn validate_cases_per_page(value: u32) -> Result<u32, ConfigError> {
    if value == 0 || value > MAX_CASES_PER_PAGE {
        return Err(ConfigError::CasesPerPage {
            value,
            max: MAX_CASES_PER_PAGE,
        });
    }
    Ok(value)
}
