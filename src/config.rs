use crate::error::Result;
use crate::matter::events::{EVENT_GLOBAL_PRIORITY, EventPriority};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory for the persisted event counter, relative to the home directory
const PERSIST_DIR: &str = ".config/matter-im-engine";

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            if (value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\''))
            {
                value = &value[1..value.len() - 1];
            }

            // Only set if not already set (env vars take precedence)
            if std::env::var(key).is_err() {
                // SAFETY: called from main before the runtime spawns any thread
                unsafe { std::env::set_var(key, value) };
            }
        }
    }
}

/// Get the default directory for the persisted event counter
pub fn default_counter_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PERSIST_DIR)
        .join("counters")
}

fn parse_priority(value: &str) -> Option<EventPriority> {
    match value.to_ascii_lowercase().as_str() {
        "debug" => Some(EventPriority::Debug),
        "info" => Some(EventPriority::Info),
        "critical" => Some(EventPriority::Critical),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub event_log: EventLogConfig,
    pub write: WriteConfig,
}

/// One event log tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    pub priority: EventPriority,
    /// Capacity in bytes
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Tiers ordered from lowest to highest priority
    pub tiers: Vec<TierConfig>,
    pub min_priority: EventPriority,
    /// Persist the event number counter here; in-memory counter when unset
    pub counter_dir: Option<PathBuf>,
    /// Event numbers reserved on disk ahead of use
    pub counter_epoch: u64,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                TierConfig {
                    priority: EventPriority::Debug,
                    capacity: 2048,
                },
                TierConfig {
                    priority: EventPriority::Info,
                    capacity: 2048,
                },
                TierConfig {
                    priority: EventPriority::Critical,
                    capacity: 1024,
                },
            ],
            min_priority: EVENT_GLOBAL_PRIORITY,
            counter_dir: None,
            counter_epoch: 0x1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConfig {
    /// Largest WriteResponse payload, in bytes
    pub max_response_size: usize,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            max_response_size: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply `EVENT_*` and `WRITE_*` environment variables.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(priority) = std::env::var("EVENT_MIN_PRIORITY")
            && let Some(p) = parse_priority(&priority)
        {
            self.event_log.min_priority = p;
        }
        if let Ok(dir) = std::env::var("EVENT_COUNTER_DIR") {
            self.event_log.counter_dir = Some(PathBuf::from(dir));
        }
        if let Ok(epoch) = std::env::var("EVENT_COUNTER_EPOCH")
            && let Ok(e) = epoch.parse()
        {
            self.event_log.counter_epoch = e;
        }
        if let Ok(size) = std::env::var("WRITE_MAX_RESPONSE_SIZE")
            && let Ok(s) = size.parse()
        {
            self.write.max_response_size = s;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        let priorities: Vec<_> = config.event_log.tiers.iter().map(|t| t.priority).collect();
        assert_eq!(
            priorities,
            vec![EventPriority::Debug, EventPriority::Info, EventPriority::Critical]
        );
        assert_eq!(config.event_log.min_priority, EventPriority::Debug);
        assert!(config.event_log.counter_dir.is_none());
        assert_eq!(config.write.max_response_size, 1024);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"event_log": {{"tiers": [{{"priority": "Critical", "capacity": 256}}], "min_priority": "Info"}}}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(
            config.event_log.tiers,
            vec![TierConfig {
                priority: EventPriority::Critical,
                capacity: 256
            }]
        );
        assert_eq!(config.event_log.min_priority, EventPriority::Info);
        assert_eq!(config.event_log.counter_epoch, 0x1000);
        assert_eq!(config.write.max_response_size, 1024);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(crate::error::ImError::SerdeJsonError(_))
        ));
    }

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_priority("CRITICAL"), Some(EventPriority::Critical));
        assert_eq!(parse_priority("verbose"), None);
    }
}
