pub mod cluster;
pub mod common;
pub mod report;
pub mod slurm;

use serde::{Deserialize, Serialize};

pub type Map<K, V> = hashbrown::HashMap<K, V>;
pub type Set<T> = hashbrown::HashSet<T>;

pub type Error = crate::common::error::ScopeError;
pub type Result<T> = std::result::Result<T, Error>;

// ID types
pub type JobId = u64;
pub type UserId = u32;

/// Job lifecycle state as reported by the scheduler. Only `Running` and
/// `Pending` jobs are interesting to the reports; everything else
/// (completing, failed, ...) is lumped into `Other` and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Running,
    Pending,
    Other,
}

impl JobState {
    pub fn parse(value: &str) -> JobState {
        match value {
            "RUNNING" => JobState::Running,
            "PENDING" => JobState::Pending,
            _ => JobState::Other,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Running => f.write_str("running"),
            JobState::Pending => f.write_str("pending"),
            JobState::Other => f.write_str("other"),
        }
    }
}

pub const GPUSCOPE_VERSION: &str = {
    match option_env!("GPUSCOPE_BUILD_VERSION") {
        Some(version) => version,
        None => const_format::concatcp!(env!("CARGO_PKG_VERSION"), "-dev"),
    }
};
