//! Runtime settings resolved from command-line flags and the environment.

use std::path::{Path, PathBuf};

use crate::logging::DEFAULT_LOG_FILTER;

pub const APP_IDENTIFIER: &str = "com.auramatic";
pub const DB_FILE_NAME: &str = "app_database.db";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

pub const ENV_DB: &str = "AURAMATIC_DB";
pub const ENV_LOG: &str = "AURAMATIC_LOG";
pub const ENV_LOG_DIR: &str = "AURAMATIC_LOG_DIR";
/// Replaces the platform data directory; used by tests.
pub const ENV_FAKE_APPDATA: &str = "AURAMATIC_FAKE_APPDATA";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_filter: String,
    pub channel_capacity: usize,
}

impl Settings {
    /// Flags win over environment variables, which win over defaults.
    pub fn resolve(cli_db: Option<PathBuf>, cli_log_dir: Option<PathBuf>) -> Self {
        Self::from_lookup(cli_db, cli_log_dir, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(cli_db: Option<PathBuf>, cli_log_dir: Option<PathBuf>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let db_path = cli_db
            .or_else(|| non_empty(ENV_DB).map(PathBuf::from))
            .or_else(|| {
                let base = non_empty(ENV_FAKE_APPDATA)
                    .map(PathBuf::from)
                    .or_else(dirs::data_dir)?;
                Some(default_db_path(&base))
            });

        Self {
            db_path,
            log_dir: cli_log_dir.or_else(|| non_empty(ENV_LOG_DIR).map(PathBuf::from)),
            log_filter: non_empty(ENV_LOG).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

pub fn default_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(APP_IDENTIFIER).join(DB_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn flags_override_environment() {
        let settings = Settings::from_lookup(
            Some(PathBuf::from("/flag.db")),
            None,
            lookup(&[(ENV_DB, "/env.db"), (ENV_LOG_DIR, "/var/log/aura")]),
        );
        assert_eq!(settings.db_path, Some(PathBuf::from("/flag.db")));
        assert_eq!(settings.log_dir, Some(PathBuf::from("/var/log/aura")));
    }

    #[test]
    fn fake_appdata_sets_default_location() {
        let settings = Settings::from_lookup(None, None, lookup(&[(ENV_FAKE_APPDATA, "/tmp/appdata")]));
        assert_eq!(
            settings.db_path,
            Some(PathBuf::from("/tmp/appdata/com.auramatic/app_database.db"))
        );
        assert_eq!(settings.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(settings.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn blank_values_are_ignored() {
        let settings = Settings::from_lookup(
            None,
            None,
            lookup(&[(ENV_DB, " "), (ENV_LOG, ""), (ENV_FAKE_APPDATA, "/data")]),
        );
        assert_eq!(
            settings.db_path,
            Some(PathBuf::from("/data/com.auramatic/app_database.db"))
        );
        assert_eq!(settings.log_filter, DEFAULT_LOG_FILTER);
    }
}
