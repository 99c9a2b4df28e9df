//! Runtime configuration for grading, rubric generation and persistence.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MODEL: &str = "openai/gpt-4o";
pub const DEFAULT_STORE_PATH: &str = ".rubric_store.sqlite";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraderConfig {
    pub model: String,
    pub grade_max_tokens: u32,
    pub generate_max_tokens: u32,
    /// Quiet period before a manual selection change is saved.
    pub autosave_delay: Duration,
    pub store_path: PathBuf,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            grade_max_tokens: 400,
            generate_max_tokens: 800,
            autosave_delay: Duration::from_millis(1_000),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

impl GraderConfig {
    /// Defaults overridden by `RUBRIC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`GraderConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(model) = lookup("RUBRIC_MODEL") {
            let model = model.trim();
            if model.is_empty() {
                return Err(ConfigError::Empty { var: "RUBRIC_MODEL" });
            }
            config.model = model.to_string();
        }
        if let Some(n) = parse_number::<u32, _>(&lookup, "RUBRIC_GRADE_MAX_TOKENS")? {
            config.grade_max_tokens = n;
        }
        if let Some(n) = parse_number::<u32, _>(&lookup, "RUBRIC_GENERATE_MAX_TOKENS")? {
            config.generate_max_tokens = n;
        }
        if let Some(ms) = parse_number::<u64, _>(&lookup, "RUBRIC_AUTOSAVE_MS")? {
            config.autosave_delay = Duration::from_millis(ms);
        }
        if let Some(path) = lookup("RUBRIC_STORE_PATH") {
            if path.trim().is_empty() {
                return Err(ConfigError::Empty {
                    var: "RUBRIC_STORE_PATH",
                });
            }
            config.store_path = PathBuf::from(path);
        }

        Ok(config)
    }
}

fn parse_number<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(ConfigError::InvalidNumber { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = GraderConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GraderConfig::default());
        assert_eq!(config.grade_max_tokens, 400);
        assert_eq!(config.generate_max_tokens, 800);
        assert_eq!(config.autosave_delay, Duration::from_secs(1));
    }

    #[test]
    fn env_overrides_apply() {
        let config = GraderConfig::from_lookup(lookup(&[
            ("RUBRIC_MODEL", "anthropic/claude-3.5-sonnet"),
            ("RUBRIC_GRADE_MAX_TOKENS", "600"),
            ("RUBRIC_AUTOSAVE_MS", "250"),
            ("RUBRIC_STORE_PATH", "/tmp/r.sqlite"),
        ]))
        .unwrap();
        assert_eq!(config.model, "anthropic/claude-3.5-sonnet");
        assert_eq!(config.grade_max_tokens, 600);
        assert_eq!(config.generate_max_tokens, 800);
        assert_eq!(config.autosave_delay, Duration::from_millis(250));
        assert_eq!(config.store_path, PathBuf::from("/tmp/r.sqlite"));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = GraderConfig::from_lookup(lookup(&[("RUBRIC_GRADE_MAX_TOKENS", "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                var: "RUBRIC_GRADE_MAX_TOKENS",
                value: "lots".into()
            }
        );
    }

    #[test]
    fn numbers_are_bounded_by_their_field_type() {
        let err = GraderConfig::from_lookup(lookup(&[("RUBRIC_GENERATE_MAX_TOKENS", "4294967296")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { var: "RUBRIC_GENERATE_MAX_TOKENS", .. }));

        let config = GraderConfig::from_lookup(lookup(&[("RUBRIC_AUTOSAVE_MS", "4294967296")])).unwrap();
        assert_eq!(config.autosave_delay, Duration::from_millis(4_294_967_296));
    }
}
