use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::slurm::records::RawJob;
use crate::{JobId, JobState, Map, UserId};

/// Numeric user id -> account name, decoded from `getent passwd` output and
/// refreshed on a long interval through the snapshot cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserTable {
    map: Map<UserId, String>,
}

impl UserTable {
    /// System accounts (uid below 100 or a dot-prefixed name) are dropped;
    /// they never own cluster jobs.
    pub fn decode(passwd: &str) -> UserTable {
        let mut map = Map::new();
        for line in passwd.lines() {
            let mut fields = line.split(':');
            let (Some(name), Some(_), Some(uid)) = (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let Ok(uid) = uid.parse::<UserId>() else {
                continue;
            };
            if uid < 100 || name.starts_with('.') {
                continue;
            }
            map.insert(uid, name.to_string());
        }
        UserTable { map }
    }

    /// Never fails: an id without a matching account renders as the raw
    /// decimal id, so one stale entry cannot break a report.
    pub fn resolve(&self, uid: UserId) -> String {
        self.map
            .get(&uid)
            .cloned()
            .unwrap_or_else(|| uid.to_string())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromIterator<(UserId, String)> for UserTable {
    fn from_iter<I: IntoIterator<Item = (UserId, String)>>(iter: I) -> Self {
        UserTable {
            map: iter.into_iter().collect(),
        }
    }
}

/// Node name -> sorted account names with a RUNNING job on it.
pub fn users_per_node(
    jobs: &Map<JobId, RawJob>,
    users: &UserTable,
) -> Map<String, BTreeSet<String>> {
    let mut per_node: Map<String, BTreeSet<String>> = Map::new();
    for job in jobs.values() {
        if job.state != JobState::Running {
            continue;
        }
        if let Some(host) = &job.batch_host {
            per_node
                .entry(host.clone())
                .or_default()
                .insert(users.resolve(job.user_id));
        }
    }
    per_node
}
