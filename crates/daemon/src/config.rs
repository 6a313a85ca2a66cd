#![forbid(unsafe_code)]

use clap::Parser;
use rg_channel::{BackoffPolicy, ChannelConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TASK_MANAGER_URL: &str = "ws://localhost:8023/backend1";
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
const DEFAULT_OUTBOX_POLL_MS: u64 = 2_000;
const DEFAULT_OUTBOX_BATCH: usize = 64;
const DEFAULT_OUTBOX_RETENTION_HOURS: u64 = 7 * 24;
const DEFAULT_FANOUT_CAPACITY: usize = 256;

/// Regression trial orchestrator.
///
/// Reads newline-delimited JSON requests on stdin and answers on stdout.
#[derive(Debug, Parser)]
#[command(name = "regressd", version)]
pub(crate) struct Cli {
    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,
    /// Directory holding the SQLite database.
    #[arg(long, value_name = "DIR")]
    pub(crate) storage_dir: Option<PathBuf>,
    /// Task manager websocket URL.
    #[arg(long, value_name = "URL")]
    pub(crate) task_manager_url: Option<String>,
    /// Run without connecting to a task manager; notifications stay queued.
    #[arg(long)]
    pub(crate) no_task_manager: bool,
    #[arg(long, value_name = "MS")]
    pub(crate) outbox_poll_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    storage_dir: Option<PathBuf>,
    fanout_capacity: Option<usize>,
    #[serde(default)]
    task_manager: TaskManagerFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskManagerFile {
    enabled: Option<bool>,
    url: Option<String>,
    backoff_base_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
    outbox_poll_ms: Option<u64>,
    outbox_batch: Option<usize>,
    outbox_retention_hours: Option<u64>,
}

#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub(crate) storage_dir: PathBuf,
    pub(crate) fanout_capacity: usize,
    /// `None` when the task manager is disabled.
    pub(crate) task_manager: Option<ChannelConfig>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("storage_dir is required (config file or --storage-dir)")]
    MissingStorageDir,
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

impl Config {
    pub(crate) fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?
            }
            None => FileConfig::default(),
        };
        Self::resolve(file, cli)
    }

    fn resolve(file: FileConfig, cli: &Cli) -> Result<Self, ConfigError> {
        let storage_dir = cli
            .storage_dir
            .clone()
            .or(file.storage_dir)
            .ok_or(ConfigError::MissingStorageDir)?;
        let fanout_capacity = file.fanout_capacity.unwrap_or(DEFAULT_FANOUT_CAPACITY);
        if fanout_capacity == 0 {
            return Err(ConfigError::Invalid("fanout_capacity must be positive"));
        }

        let tm = file.task_manager;
        let url = cli
            .task_manager_url
            .clone()
            .or(tm.url)
            .unwrap_or_else(|| DEFAULT_TASK_MANAGER_URL.to_string());
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::Invalid("task_manager.url must be a ws:// or wss:// URL"));
        }
        let base = tm.backoff_base_ms.unwrap_or(DEFAULT_BACKOFF_BASE_MS);
        let max = tm.backoff_max_ms.unwrap_or(DEFAULT_BACKOFF_MAX_MS);
        if base == 0 {
            return Err(ConfigError::Invalid("task_manager.backoff_base_ms must be positive"));
        }
        if base > max {
            return Err(ConfigError::Invalid(
                "task_manager.backoff_base_ms must not exceed backoff_max_ms",
            ));
        }
        let poll = cli
            .outbox_poll_ms
            .or(tm.outbox_poll_ms)
            .unwrap_or(DEFAULT_OUTBOX_POLL_MS);
        if poll == 0 {
            return Err(ConfigError::Invalid("task_manager.outbox_poll_ms must be positive"));
        }
        let batch = tm.outbox_batch.unwrap_or(DEFAULT_OUTBOX_BATCH);
        if batch == 0 {
            return Err(ConfigError::Invalid("task_manager.outbox_batch must be positive"));
        }
        let retention_hours = tm
            .outbox_retention_hours
            .unwrap_or(DEFAULT_OUTBOX_RETENTION_HOURS);
        if retention_hours == 0 {
            return Err(ConfigError::Invalid("task_manager.outbox_retention_hours must be positive"));
        }

        let enabled = !cli.no_task_manager && tm.enabled.unwrap_or(true);
        let task_manager = enabled.then(|| ChannelConfig {
            url,
            backoff: BackoffPolicy {
                base: Duration::from_millis(base),
                max: Duration::from_millis(max),
            },
            outbox_poll: Duration::from_millis(poll),
            outbox_batch: batch,
            outbox_retention: Duration::from_secs(retention_hours.saturating_mul(3600)),
        });

        Ok(Self {
            storage_dir,
            fanout_capacity,
            task_manager,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["regressd"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    fn file(raw: &str) -> FileConfig {
        toml::from_str(raw).expect("parse config")
    }

    #[test]
    fn defaults_apply_when_only_storage_dir_is_given() {
        let config = Config::resolve(FileConfig::default(), &cli(&["--storage-dir", "/var/regress"]))
            .expect("resolve");
        assert_eq!(config.storage_dir, PathBuf::from("/var/regress"));
        assert_eq!(config.fanout_capacity, 256);
        let tm = config.task_manager.expect("enabled by default");
        assert_eq!(tm.url, "ws://localhost:8023/backend1");
        assert_eq!(tm.backoff.base, Duration::from_millis(500));
        assert_eq!(tm.backoff.max, Duration::from_secs(30));
        assert_eq!(tm.outbox_poll, Duration::from_secs(2));
        assert_eq!(tm.outbox_batch, 64);
        assert_eq!(tm.outbox_retention, Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn cli_overrides_file_values() {
        let raw = r#"
            storage_dir = "/from/file"
            fanout_capacity = 8

            [task_manager]
            url = "ws://tm.internal:9000/backend1"
            outbox_poll_ms = 750
            outbox_retention_hours = 12
        "#;
        let config = Config::resolve(
            file(raw),
            &cli(&["--storage-dir", "/from/cli", "--task-manager-url", "wss://tm/backend1"]),
        )
        .expect("resolve");
        assert_eq!(config.storage_dir, PathBuf::from("/from/cli"));
        assert_eq!(config.fanout_capacity, 8);
        let tm = config.task_manager.expect("enabled");
        assert_eq!(tm.url, "wss://tm/backend1");
        assert_eq!(tm.outbox_poll, Duration::from_millis(750));
        assert_eq!(tm.outbox_retention, Duration::from_secs(12 * 3600));
    }

    #[test]
    fn task_manager_can_be_disabled() {
        let config = Config::resolve(
            file("[task_manager]\nenabled = false\n"),
            &cli(&["--storage-dir", "/x"]),
        )
        .expect("resolve");
        assert!(config.task_manager.is_none());

        let config = Config::resolve(FileConfig::default(), &cli(&["--storage-dir", "/x", "--no-task-manager"]))
            .expect("resolve");
        assert!(config.task_manager.is_none());
    }

    #[test_case("[task_manager]\noutbox_batch = 0\n" ; "zero batch")]
    #[test_case("[task_manager]\noutbox_retention_hours = 0\n" ; "zero retention")]
    #[test_case("[task_manager]\nbackoff_base_ms = 5000\nbackoff_max_ms = 100\n" ; "base above max")]
    #[test_case("[task_manager]\nurl = \"http://tm/backend1\"\n" ; "non websocket url")]
    #[test_case("fanout_capacity = 0\n" ; "zero fanout capacity")]
    fn invalid_values_are_rejected(raw: &str) {
        let err = Config::resolve(file(raw), &cli(&["--storage-dir", "/x"])).expect_err("invalid");
        assert!(matches!(err, ConfigError::Invalid(_)), "unexpected: {err}");
    }

    #[test]
    fn storage_dir_is_required() {
        let err = Config::resolve(FileConfig::default(), &cli(&[])).expect_err("missing");
        assert!(matches!(err, ConfigError::MissingStorageDir));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("storage = \"/x\"\n").is_err());
    }
}
