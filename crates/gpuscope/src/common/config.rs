use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Configuration surface consumed by the reporting engine. Every field has a
/// default, so an absent config file yields a fully working setup; unknown
/// keys in the file are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Refresh interval (seconds) of the live cluster snapshots.
    pub refresh_interval: u64,
    /// Refresh interval (seconds) of the uid -> account name table.
    pub user_refresh_interval: u64,
    /// Partition whose jobs may be preempted; their resource claims are
    /// estimated from job allocation records.
    pub lowpri_partition: String,
    /// General-purpose non-GPU partition, always excluded from usage and
    /// job reports.
    pub general_partition: String,
    /// Newer accelerator classes, newest first.
    pub new_gpu_display_order: Vec<String>,
    /// Legacy accelerator classes, displayed last.
    pub old_gpu_display_order: Vec<String>,
    /// Data rows per job-listing page.
    pub jobs_page_size: usize,
    pub leaderboards: Vec<LeaderboardSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaderboardSpec {
    pub title: String,
    /// A user whose total GPU count exceeds this limit gets a flagged row.
    pub flag_threshold: i64,
    pub excluded_partitions: Vec<String>,
}

impl Default for LeaderboardSpec {
    fn default() -> Self {
        Self {
            title: "GPU usage".to_string(),
            flag_threshold: 12,
            excluded_partitions: vec!["cpu".to_string()],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            refresh_interval: 2,
            user_refresh_interval: 24 * 60 * 60,
            lowpri_partition: "lowpri".to_string(),
            general_partition: "cpu".to_string(),
            new_gpu_display_order: strings(&["a6000", "a40", "a4500", "rtx8k", "rtx6k", "v100s"]),
            old_gpu_display_order: strings(&["p40", "m40"]),
            jobs_page_size: 75,
            leaderboards: vec![
                LeaderboardSpec {
                    title: "GPU usage".to_string(),
                    flag_threshold: 12,
                    excluded_partitions: strings(&["cpu", "lowpri"]),
                },
                LeaderboardSpec {
                    title: "GPU usage incl. low priority".to_string(),
                    flag_threshold: 40,
                    excluded_partitions: strings(&["cpu"]),
                },
                LeaderboardSpec {
                    title: "Overall usage".to_string(),
                    flag_threshold: 52,
                    excluded_partitions: vec![],
                },
            ],
        }
    }
}

impl Config {
    /// Loads the configuration from `path` if given, otherwise from the
    /// default location; a missing default file yields `Config::default()`.
    pub fn load(path: Option<&Path>) -> crate::Result<Config> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Config::default()),
            },
        };
        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub fn user_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.user_refresh_interval)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gpuscope").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::Config;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.refresh_interval().as_secs(), 2);
        assert_eq!(config.user_refresh_interval().as_secs(), 86400);
        assert_eq!(config.jobs_page_size, 75);
        assert_eq!(config.new_gpu_display_order[0], "a6000");
        assert_eq!(config.leaderboards.len(), 3);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
refresh_interval = 5
lowpri_partition = "scavenger"

[[leaderboards]]
title = "Main"
flag_threshold = 8
excluded_partitions = ["cpu"]
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.refresh_interval, 5);
        assert_eq!(config.lowpri_partition, "scavenger");
        // unset fields fall back to defaults
        assert_eq!(config.jobs_page_size, 75);
        assert_eq!(config.leaderboards.len(), 1);
        assert_eq!(config.leaderboards[0].flag_threshold, 8);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "refresh_interval = \"often\"").unwrap();
        assert!(Config::load(Some(file.path())).is_err());
    }
}
