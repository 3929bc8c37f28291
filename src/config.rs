use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, warn};

use crate::friends::DEFAULT_SUGGESTION_LIMIT;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    /// Directory holding the native session file.
    pub token_dir: PathBuf,
    pub http_timeout: Duration,
    pub search_debounce: Duration,
    pub suggestion_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token_dir: PathBuf::from(".trackitnow"),
            http_timeout: Duration::from_secs(30),
            search_debounce: Duration::from_millis(400),
            suggestion_limit: DEFAULT_SUGGESTION_LIMIT,
        }
    }
}

impl ClientConfig {
    /// Reads `TRACKIT_*` variables from the process environment. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup. Missing or
    /// unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_url: try_load(&lookup, "TRACKIT_API_URL", defaults.api_url),
            token_dir: PathBuf::from(try_load(
                &lookup,
                "TRACKIT_TOKEN_DIR",
                defaults.token_dir.display().to_string(),
            )),
            http_timeout: Duration::from_secs(try_load(
                &lookup,
                "TRACKIT_HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )),
            search_debounce: Duration::from_millis(try_load(
                &lookup,
                "TRACKIT_SEARCH_DEBOUNCE_MS",
                defaults.search_debounce.as_millis() as u64,
            )),
            suggestion_limit: try_load(&lookup, "TRACKIT_SUGGESTION_LIMIT", defaults.suggestion_limit),
        }
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        debug!("{key} not set, using default: {default}");
        return default;
    };
    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value '{raw}': {e}, using default: {default}");
        default
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(ClientConfig::from_lookup(|_| None), ClientConfig::default());
    }

    #[test]
    fn variables_override_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("TRACKIT_API_URL", "https://api.trackitnow.app"),
            ("TRACKIT_TOKEN_DIR", "/tmp/trackit"),
            ("TRACKIT_HTTP_TIMEOUT_SECS", "5"),
            ("TRACKIT_SEARCH_DEBOUNCE_MS", " 250 "),
            ("TRACKIT_SUGGESTION_LIMIT", "8"),
        ]));

        assert_eq!(config.api_url, "https://api.trackitnow.app");
        assert_eq!(config.token_dir, PathBuf::from("/tmp/trackit"));
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.search_debounce, Duration::from_millis(250));
        assert_eq!(config.suggestion_limit, 8);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("TRACKIT_HTTP_TIMEOUT_SECS", "soon"),
            ("TRACKIT_SUGGESTION_LIMIT", "-1"),
        ]));

        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.suggestion_limit, DEFAULT_SUGGESTION_LIMIT);
    }
}
