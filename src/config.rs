use std::path::PathBuf;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-flash";
pub const DEFAULT_ENHANCE_MODEL: &str = "gemini-pro";
pub const DEFAULT_LOG_FILTER: &str = "jobpilot=warn";

/// Runtime configuration, read from the environment (and `.env` if present).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Overrides the platform data directory for the store file.
    pub db_path: Option<PathBuf>,
    /// Model for cover letters and interview guides.
    pub text_model: String,
    /// Model for structured resume enhancement.
    pub enhance_model: String,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: None,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            enhance_model: DEFAULT_ENHANCE_MODEL.to_string(),
            rust_log: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        // A missing .env is the normal case.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        Config {
            db_path: non_blank("JOBPILOT_DB").map(PathBuf::from),
            text_model: non_blank("JOBPILOT_MODEL").unwrap_or(defaults.text_model),
            enhance_model: non_blank("JOBPILOT_ENHANCE_MODEL").unwrap_or(defaults.enhance_model),
            rust_log: non_blank("RUST_LOG").unwrap_or(defaults.rust_log),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.text_model, "gemini-flash");
        assert_eq!(config.enhance_model, "gemini-pro");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("JOBPILOT_DB", "/tmp/jobs.db"),
            ("JOBPILOT_MODEL", "sonnet"),
            ("JOBPILOT_ENHANCE_MODEL", "gpt-4o"),
            ("RUST_LOG", "jobpilot=debug"),
        ]));
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/jobs.db")));
        assert_eq!(config.text_model, "sonnet");
        assert_eq!(config.enhance_model, "gpt-4o");
        assert_eq!(config.rust_log, "jobpilot=debug");
    }

    #[test]
    fn test_blank_values_fall_back() {
        let config = Config::from_lookup(lookup(&[("JOBPILOT_MODEL", "  "), ("JOBPILOT_DB", "")]));
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
        assert!(config.db_path.is_none());
    }
}
