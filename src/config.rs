//! Client configuration from the environment

use crate::conversation::{ExplainStyle, Preferences};
use crate::transport::{RetryPolicy, TimeoutPolicy};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api/chat";

/// Upper bound for `MATHTUTOR_MAX_RETRIES`
pub const MAX_RETRIES_CEILING: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be an http(s) URL, got {value:?}")]
    InvalidUrl { var: &'static str, value: String },
}

/// Everything the binary needs to wire up a session
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    pub health_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub image_timeout: Duration,
    pub max_retries: u32,
    pub db_path: PathBuf,
    pub show_steps: bool,
    pub explain_style: ExplainStyle,
}

impl ClientConfig {
    /// Load from `MATHTUTOR_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for variable values. Malformed numbers and flags
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = var("MATHTUTOR_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        validate_url("MATHTUTOR_API_URL", &api_url)?;

        let health_url = match var("MATHTUTOR_HEALTH_URL") {
            Some(url) => {
                validate_url("MATHTUTOR_HEALTH_URL", &url)?;
                url
            }
            None => sibling_health_url(&api_url),
        };

        let db_path = var("MATHTUTOR_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| ".".to_string());
                PathBuf::from(home).join(".mathtutor").join("mathtutor.db")
            },
            PathBuf::from,
        );

        Ok(Self {
            api_url,
            health_url,
            token: var("MATHTUTOR_TOKEN"),
            timeout: Duration::from_secs(parse_or("MATHTUTOR_TIMEOUT_SECS", var("MATHTUTOR_TIMEOUT_SECS"), 30)),
            image_timeout: Duration::from_secs(parse_or(
                "MATHTUTOR_IMAGE_TIMEOUT_SECS",
                var("MATHTUTOR_IMAGE_TIMEOUT_SECS"),
                60,
            )),
            max_retries: clamp_retries(parse_or(
                "MATHTUTOR_MAX_RETRIES",
                var("MATHTUTOR_MAX_RETRIES"),
                2,
            )),
            db_path,
            show_steps: parse_flag("MATHTUTOR_SHOW_STEPS", var("MATHTUTOR_SHOW_STEPS"), true),
            explain_style: parse_or(
                "MATHTUTOR_EXPLAIN_STYLE",
                var("MATHTUTOR_EXPLAIN_STYLE"),
                ExplainStyle::default(),
            ),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        }
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            default: self.timeout,
            image_upload: self.image_timeout,
        }
    }

    pub fn preferences(&self) -> Preferences {
        Preferences {
            show_steps: self.show_steps,
            explain_style: self.explain_style,
        }
    }
}

fn validate_url(var: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            var,
            value: value.to_string(),
        })
    }
}

/// `http://host/api/chat` -> `http://host/api/health`
fn sibling_health_url(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    match trimmed.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('/') {
            Some((parent, _)) => format!("{scheme}://{parent}/health"),
            None => format!("{trimmed}/api/health"),
        },
        None => format!("{trimmed}/api/health"),
    }
}

fn parse_or<T>(var: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    let Some(raw) = value else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(var, value = %raw, ?default, "Ignoring malformed setting");
        default
    })
}

fn clamp_retries(requested: u32) -> u32 {
    if requested > MAX_RETRIES_CEILING {
        tracing::warn!(
            requested,
            ceiling = MAX_RETRIES_CEILING,
            "MATHTUTOR_MAX_RETRIES too large, clamping"
        );
    }
    requested.min(MAX_RETRIES_CEILING)
}

fn parse_flag(var: &str, value: Option<String>, default: bool) -> bool {
    let Some(raw) = value else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(var, value = %raw, default, "Ignoring malformed flag");
            default
        }
    }
}
