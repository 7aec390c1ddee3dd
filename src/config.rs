//! Configuration types.
//!
//! Everything is read from `NOTSPAM_*` environment variables. The lookup is
//! injectable so tests never touch the process environment.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Engine used when `NOTSPAM_CLASSIFIER` is not set.
pub const DEFAULT_ENGINE: &str = "sylfilter";

/// Tags given to newly indexed messages when `NOTSPAM_NEW_TAGS` is not set.
pub const DEFAULT_NEW_TAGS: &[&str] = &["inbox", "unread"];

/// Default `spamc --max-size` in bytes.
pub const DEFAULT_SPAMC_MAX_SIZE: u64 = 5_000_000;

/// Default number of paths handed to one sylfilter training run.
pub const DEFAULT_SYLFILTER_BATCH: usize = 10_000;

/// Per-engine knobs passed to engine factories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// spamd socket for `spamc --socket=`; spamc's own default when unset.
    pub spamd_socket: Option<PathBuf>,
    /// Largest message spamc will hand to spamd.
    pub spamc_max_size: u64,
    /// Maximum message paths per batched training invocation.
    pub batch_size: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            spamd_socket: None,
            spamc_max_size: DEFAULT_SPAMC_MAX_SIZE,
            batch_size: DEFAULT_SYLFILTER_BATCH,
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct NotspamConfig {
    /// Selected engine name, already lower-cased.
    pub engine: String,
    /// Whether the per-message audit log is written to stdout.
    pub audit_log: bool,
    /// Location of the message index database.
    pub db_path: PathBuf,
    /// Tags applied to messages when they are first indexed.
    pub new_tags: Vec<String>,
    pub engine_options: EngineOptions,
}

impl NotspamConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let engine = lookup("NOTSPAM_CLASSIFIER")
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_ENGINE.to_string());

        let audit_log = lookup("NOTSPAM_LOG").is_some_and(|s| !s.is_empty());

        let db_path = match lookup("NOTSPAM_DB").filter(|s| !s.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => {
                let home = lookup("HOME").unwrap_or_else(|| ".".to_string());
                PathBuf::from(home).join(".notspam").join("index.db")
            }
        };

        let new_tags: Vec<String> = match lookup("NOTSPAM_NEW_TAGS") {
            Some(raw) => split_list(&raw),
            None => DEFAULT_NEW_TAGS.iter().map(|s| s.to_string()).collect(),
        };

        let spamd_socket = lookup("NOTSPAM_SPAMD_SOCKET")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let spamc_max_size = match lookup("NOTSPAM_SPAMC_MAX_SIZE") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "NOTSPAM_SPAMC_MAX_SIZE".into(),
                message: format!("{raw:?}: {e}"),
            })?,
            None => DEFAULT_SPAMC_MAX_SIZE,
        };

        let batch_size = match lookup("NOTSPAM_SYLFILTER_BATCH") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) => {
                    return Err(ConfigError::InvalidValue {
                        key: "NOTSPAM_SYLFILTER_BATCH".into(),
                        message: "must be greater than zero".into(),
                    });
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        key: "NOTSPAM_SYLFILTER_BATCH".into(),
                        message: format!("{raw:?}: {e}"),
                    });
                }
            },
            None => DEFAULT_SYLFILTER_BATCH,
        };

        Ok(Self {
            engine,
            audit_log,
            db_path,
            new_tags,
            engine_options: EngineOptions {
                spamd_socket,
                spamc_max_size,
                batch_size,
            },
        })
    }
}

/// Split a comma-separated list, trimming items and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<NotspamConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NotspamConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[("HOME", "/home/alice")]).unwrap();
        assert_eq!(config.engine, "sylfilter");
        assert!(!config.audit_log);
        assert_eq!(
            config.db_path,
            PathBuf::from("/home/alice/.notspam/index.db")
        );
        assert_eq!(config.new_tags, vec!["inbox", "unread"]);
        assert_eq!(config.engine_options, EngineOptions::default());
    }

    #[test]
    fn classifier_name_is_lowercased() {
        let config = config_from(&[("NOTSPAM_CLASSIFIER", "BogoFilter")]).unwrap();
        assert_eq!(config.engine, "bogofilter");
    }

    #[test]
    fn empty_log_variable_keeps_audit_off() {
        assert!(!config_from(&[("NOTSPAM_LOG", "")]).unwrap().audit_log);
        assert!(config_from(&[("NOTSPAM_LOG", "1")]).unwrap().audit_log);
    }

    #[test]
    fn engine_options_from_env() {
        let config = config_from(&[
            ("NOTSPAM_SPAMD_SOCKET", "/run/spamd.sock"),
            ("NOTSPAM_SPAMC_MAX_SIZE", "1024"),
            ("NOTSPAM_SYLFILTER_BATCH", "50"),
        ])
        .unwrap();
        assert_eq!(
            config.engine_options.spamd_socket,
            Some(PathBuf::from("/run/spamd.sock"))
        );
        assert_eq!(config.engine_options.spamc_max_size, 1024);
        assert_eq!(config.engine_options.batch_size, 50);
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = config_from(&[("NOTSPAM_SYLFILTER_BATCH", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn non_numeric_max_size_rejected() {
        let err = config_from(&[("NOTSPAM_SPAMC_MAX_SIZE", "big")]).unwrap_err();
        assert!(err.to_string().contains("NOTSPAM_SPAMC_MAX_SIZE"));
    }

    #[test]
    fn new_tags_list_is_trimmed() {
        let config = config_from(&[("NOTSPAM_NEW_TAGS", " new, ,inbox ")]).unwrap();
        assert_eq!(config.new_tags, vec!["new", "inbox"]);
    }
}
