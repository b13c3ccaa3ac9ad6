use std::time::Duration;

use crate::error::{Result, SurveyError};

pub const DEFAULT_BASE_URL: &str = "https://canvas.uautonoma.cl";
const DEFAULT_LOG_LEVEL: &str = "canvas_survey_rates=info";

/// Runtime settings read from the environment (and `.env`, when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub token: String,
    pub per_page: u32,
    pub poll: PollPolicy,
    pub log_level: String,
}

/// How long to wait on an asynchronous report job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: 300,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("CANVAS_API_TOKEN")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                SurveyError::Configuration(
                    "CANVAS_API_TOKEN must be set to a Canvas access token".to_string(),
                )
            })?;

        let base_url = lookup("CANVAS_BASE_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();

        let defaults = PollPolicy::default();
        let per_page = parse_number(&lookup, "CANVAS_PER_PAGE", 100)?;
        let interval_ms = parse_number(
            &lookup,
            "CANVAS_POLL_INTERVAL_MS",
            defaults.interval.as_millis() as u64,
        )?;
        let max_attempts = parse_number(&lookup, "CANVAS_POLL_MAX_ATTEMPTS", defaults.max_attempts)?;

        Ok(Self {
            base_url,
            token,
            per_page,
            poll: PollPolicy {
                interval: Duration::from_millis(interval_ms),
                max_attempts: max_attempts.max(1),
            },
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            SurveyError::Configuration(format!("{key} must be a positive number, got {raw:?}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn missing_token_is_a_configuration_error() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, SurveyError::Configuration(_)));

        let err = Config::from_lookup(lookup_from(&[("CANVAS_API_TOKEN", "   ")])).unwrap_err();
        assert!(matches!(err, SurveyError::Configuration(_)));
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let config = Config::from_lookup(lookup_from(&[("CANVAS_API_TOKEN", "abc")])).unwrap();
        assert_eq!(config.token, "abc");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.per_page, 100);
        assert_eq!(config.poll, PollPolicy::default());
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("CANVAS_API_TOKEN", "abc"),
            ("CANVAS_BASE_URL", "http://localhost:8080/"),
            ("CANVAS_PER_PAGE", "50"),
            ("CANVAS_POLL_INTERVAL_MS", "250"),
            ("CANVAS_POLL_MAX_ATTEMPTS", "12"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.per_page, 50);
        assert_eq!(config.poll.interval, Duration::from_millis(250));
        assert_eq!(config.poll.max_attempts, 12);
    }

    #[test]
    fn bad_numbers_name_the_key() {
        let err = Config::from_lookup(lookup_from(&[
            ("CANVAS_API_TOKEN", "abc"),
            ("CANVAS_POLL_MAX_ATTEMPTS", "forever"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CANVAS_POLL_MAX_ATTEMPTS"));
    }
}
