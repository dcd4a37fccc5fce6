use std::time::Duration;

use itertools::Itertools;

use crate::cluster::classify::{GpuNode, gmem_by_type, node_types};
use crate::cluster::users::UserTable;
use crate::common::config::{Config, LeaderboardSpec};
use crate::report::blocks::ReportBlock;
use crate::report::table::{Justify, TextTable};
use crate::slurm::records::RawJob;
use crate::{JobId, JobState, Map};

const LONG_RUNNING: Duration = Duration::from_secs(24 * 60 * 60);
const FLAG: char = '⚠';

const HEADER: [&str; 7] = ["user", "total", "new", "48g", "shell", "24h+", "by type"];

const JUSTIFY: [Justify; 7] = [
    Justify::Left,
    Justify::Right,
    Justify::Right,
    Justify::Right,
    Justify::Right,
    Justify::Right,
    Justify::Left,
];

#[derive(Debug, Default)]
struct UserUsage {
    total: i64,
    shell: i64,
    hrs24: i64,
    by_type: Map<String, i64>,
}

/// Builds one ranked per-user usage table. Every RUNNING job outside the
/// excluded partitions contributes its requested GPU count to its owner's
/// counters; users without any contribution never get a row.
pub fn build_leaderboard(
    spec: &LeaderboardSpec,
    jobs: &Map<JobId, RawJob>,
    users: &UserTable,
    classified: &Map<String, Vec<GpuNode>>,
    config: &Config,
) -> Vec<ReportBlock> {
    let types = node_types(classified);
    let gmem = gmem_by_type(classified);

    let mut usage: Map<String, UserUsage> = Map::new();
    for job in jobs.values() {
        if job.state != JobState::Running {
            continue;
        }
        if spec.excluded_partitions.contains(&job.partition) {
            continue;
        }
        let entry = usage.entry(users.resolve(job.user_id)).or_default();
        entry.total += job.req_gpus;
        if !job.batch {
            entry.shell += job.req_gpus;
        }
        if job.elapsed >= LONG_RUNNING {
            entry.hrs24 += job.req_gpus;
        }
        if let Some(gpu_type) = job.batch_host.as_ref().and_then(|host| types.get(host)) {
            *entry.by_type.entry(gpu_type.clone()).or_default() += job.req_gpus;
        }
    }

    if usage.is_empty() {
        return vec![
            ReportBlock::Label(format!("*{}*", spec.title)),
            ReportBlock::Label("No users found!".to_string()),
        ];
    }

    let mut ranked: Vec<(String, i64, i64, UserUsage)> = usage
        .into_iter()
        .map(|(name, counters)| {
            let new: i64 = config
                .new_gpu_display_order
                .iter()
                .filter_map(|gpu_type| counters.by_type.get(gpu_type))
                .sum();
            let g48: i64 = counters
                .by_type
                .iter()
                .filter(|(gpu_type, _)| gmem.get(*gpu_type).map(String::as_str) == Some("48G"))
                .map(|(_, count)| *count)
                .sum();
            (name, new, g48, counters)
        })
        .collect();
    ranked.sort_by(|(a_name, a_new, a_g48, a), (b_name, b_new, b_g48, b)| {
        b.total
            .cmp(&a.total)
            .then_with(|| b_g48.cmp(a_g48))
            .then_with(|| b_new.cmp(a_new))
            .then_with(|| b.shell.cmp(&a.shell))
            .then_with(|| a.hrs24.cmp(&b.hrs24))
            .then_with(|| a_name.cmp(b_name))
    });

    let mut table = TextTable::new(
        HEADER.iter().map(|h| h.to_string()).collect(),
        JUSTIFY.to_vec(),
    );
    for (name, new, g48, counters) in &ranked {
        let name = if counters.total > spec.flag_threshold {
            format!("{FLAG} {name}")
        } else {
            name.clone()
        };
        let breakdown = counters
            .by_type
            .iter()
            .filter(|(_, count)| **count > 0)
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(gpu_type, count)| format!("{gpu_type}:{count}"))
            .join(" ");
        table.push_row(vec![
            name,
            counters.total.to_string(),
            new.to_string(),
            g48.to_string(),
            counters.shell.to_string(),
            counters.hrs24.to_string(),
            breakdown,
        ]);
    }

    vec![
        ReportBlock::Label(format!("*{}*", spec.title)),
        ReportBlock::Table(table.render()),
    ]
}
