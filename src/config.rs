//! Process configuration, read once from the environment at startup.

use std::path::PathBuf;

pub const DEFAULT_DB_FILE: &str = "timetable.sqlite3";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Opened before the first request when set (`TIMETABLED_WORKSPACE`).
    pub workspace: Option<PathBuf>,
    /// Database file name inside a workspace (`TIMETABLED_DB_FILE`).
    pub db_file: String,
    /// Used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            db_file: DEFAULT_DB_FILE.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let d = Self::default();
        Self {
            workspace: non_blank("TIMETABLED_WORKSPACE").map(PathBuf::from),
            db_file: non_blank("TIMETABLED_DB_FILE").unwrap_or(d.db_file),
            log_filter: d.log_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let env: HashMap<&str, &str> = [("TIMETABLED_WORKSPACE", "  "), ("TIMETABLED_DB_FILE", "")].into();
        let cfg = DaemonConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg, DaemonConfig::default());
    }

    #[test]
    fn explicit_values_are_used() {
        let env: HashMap<&str, &str> = [("TIMETABLED_WORKSPACE", "/tmp/ws"), ("TIMETABLED_DB_FILE", "t.db")].into();
        let cfg = DaemonConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cfg.db_file, "t.db");
    }
}
