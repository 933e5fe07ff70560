//! Reader configuration, resolved from the environment.
//!
//! Everything here can change between (and during) sessions via
//! universal-variable notification; [`ReaderConfig::refresh`] re-reads the
//! env-derived values in place.

use tracing::debug;

use crate::contract::EnvProvider;

pub const DEFAULT_HISTORY_NAME: &str = "default";
const DEFAULT_SCREEN_WIDTH: usize = 80;

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub term: Option<String>,
    pub history_name: String,
    /// Escape disambiguation delay; clamping happens in the char queue.
    pub escape_delay_ms: Option<i64>,
    pub screen_width: usize,
    /// Packed color for the autosuggestion ghost text.
    pub autosuggestion_color: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            term: None,
            history_name: DEFAULT_HISTORY_NAME.to_string(),
            escape_delay_ms: None,
            screen_width: DEFAULT_SCREEN_WIDTH,
            autosuggestion_color: suggestion_color(),
        }
    }
}

impl ReaderConfig {
    pub fn from_env(env: &dyn EnvProvider) -> Self {
        let mut config = Self::default();
        config.refresh(env);
        config
    }

    /// Re-read the env-derived values (uvar change, SIGWINCH).
    pub fn refresh(&mut self, env: &dyn EnvProvider) {
        self.term = env.get("TERM");
        self.history_name = env
            .get("fish_history")
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_HISTORY_NAME.to_string());
        self.escape_delay_ms = env
            .get("fish_escape_delay_ms")
            .and_then(|v| v.trim().parse::<i64>().ok());
        self.screen_width = env
            .get("COLUMNS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&w| w > 0)
            .unwrap_or(DEFAULT_SCREEN_WIDTH);
        debug!(
            target: "reader.config",
            history = %self.history_name,
            width = self.screen_width,
            "config refreshed"
        );
    }
}

/// Dim gray, the conventional ghost-text pen.
fn suggestion_color() -> u32 {
    use core_term::color::{ColorSpec, PackedColor};
    PackedColor::new(ColorSpec::indexed(8), ColorSpec::NORMAL).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapEnv(HashMap<String, String>);

    impl EnvProvider for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }

    #[test]
    fn defaults_without_env() {
        let config = ReaderConfig::from_env(&MapEnv(HashMap::new()));
        assert_eq!(config.history_name, "default");
        assert_eq!(config.screen_width, 80);
        assert_eq!(config.escape_delay_ms, None);
    }

    #[test]
    fn env_overrides_apply() {
        let mut map = HashMap::new();
        map.insert("TERM".to_string(), "xterm-256color".to_string());
        map.insert("fish_history".to_string(), "work".to_string());
        map.insert("fish_escape_delay_ms".to_string(), "120".to_string());
        map.insert("COLUMNS".to_string(), "132".to_string());
        let config = ReaderConfig::from_env(&MapEnv(map));
        assert_eq!(config.term.as_deref(), Some("xterm-256color"));
        assert_eq!(config.history_name, "work");
        assert_eq!(config.escape_delay_ms, Some(120));
        assert_eq!(config.screen_width, 132);
    }

    #[test]
    fn junk_values_fall_back() {
        let mut map = HashMap::new();
        map.insert("COLUMNS".to_string(), "wide".to_string());
        map.insert("fish_history".to_string(), String::new());
        let config = ReaderConfig::from_env(&MapEnv(map));
        assert_eq!(config.screen_width, 80);
        assert_eq!(config.history_name, "default");
    }
}
