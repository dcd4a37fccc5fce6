use chrono::NaiveDateTime;

use crate::cluster::classify::{GpuNode, gmem_by_type, node_types};
use crate::cluster::lowprio::job_claims;
use crate::cluster::users::UserTable;
use crate::common::config::Config;
use crate::common::format::format_mem;
use crate::common::utils::str::truncate;
use crate::report::blocks::ReportBlock;
use crate::report::table::{Justify, TextTable};
use crate::slurm::fields::format_slurm_duration;
use crate::slurm::records::RawJob;
use crate::{JobId, JobState, Map};

const PARTITION_WIDTH: usize = 8;
const NAME_WIDTH: usize = 20;
const REASON_WIDTH: usize = 30;

const COLUMNS: [&str; 15] = [
    "id",
    "partition",
    "name",
    "user",
    "elapsed",
    "limit",
    "start",
    "end",
    "prio",
    "gpus",
    "type",
    "gmem",
    "cpus",
    "mem",
    "node (reason)",
];

#[derive(Debug, Clone)]
pub struct JobFilter {
    pub state: JobState,
    pub user: Option<String>,
}

/// Builds the paginated job table for one lifecycle state. Columns that are
/// empty for every job of this invocation are dropped before rendering;
/// optional numeric cells render zero as empty, so an all-zero column
/// disappears with them. Pages repeat the header and share the column
/// widths of the whole filtered set.
pub fn build_job_listing(
    jobs: &Map<JobId, RawJob>,
    users: &UserTable,
    classified: &Map<String, Vec<GpuNode>>,
    config: &Config,
    filter: &JobFilter,
) -> Vec<ReportBlock> {
    let types = node_types(classified);
    let gmem = gmem_by_type(classified);

    let mut selected: Vec<(&RawJob, String)> = jobs
        .values()
        .filter(|job| job.state == filter.state && job.partition != config.general_partition)
        .map(|job| (job, users.resolve(job.user_id)))
        .filter(|(_, user)| filter.user.as_ref().map(|wanted| wanted == user).unwrap_or(true))
        .collect();

    if selected.is_empty() {
        return vec![ReportBlock::Label(format!("No {} jobs!", filter.state))];
    }

    selected.sort_by(|(a, _), (b, _)| {
        a.partition
            .cmp(&b.partition)
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| a.id.cmp(&b.id))
    });

    let rows: Vec<Vec<String>> = selected
        .iter()
        .map(|(job, user)| job_row(job, user, &types, &gmem))
        .collect();

    // the populated-column set is recomputed for every invocation
    let populated: Vec<usize> = (0..COLUMNS.len())
        .filter(|column| rows.iter().any(|row| !row[*column].is_empty()))
        .collect();
    let header: Vec<String> = populated
        .iter()
        .map(|column| COLUMNS[*column].to_string())
        .collect();
    let projected: Vec<Vec<String>> = rows
        .into_iter()
        .map(|row| {
            populated
                .iter()
                .map(|column| row[*column].clone())
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|cell| cell.chars().count()).collect();
    for row in &projected {
        for (column, cell) in row.iter().enumerate() {
            widths[column] = widths[column].max(cell.chars().count());
        }
    }

    let justify = vec![Justify::Right; header.len()];
    let mut blocks = Vec::new();
    for page in projected.chunks(config.jobs_page_size.max(1)) {
        let mut table = TextTable::new(header.clone(), justify.clone());
        for row in page {
            table.push_row(row.clone());
        }
        blocks.push(ReportBlock::Table(table.render_with(&widths)));
    }
    blocks
}

fn job_row(
    job: &RawJob,
    user: &str,
    types: &Map<String, String>,
    gmem: &Map<String, String>,
) -> Vec<String> {
    let claims = job_claims(job);
    let cpus: i64 = claims.iter().map(|(_, claim)| claim.cpus).sum();
    let mem_mib: i64 = claims.iter().map(|(_, claim)| claim.mem_mib).sum();
    let gpu_type = job
        .batch_host
        .as_ref()
        .and_then(|host| types.get(host))
        .cloned()
        .unwrap_or_default();
    let gmem_tag = gmem.get(&gpu_type).cloned().unwrap_or_default();

    vec![
        job.id.to_string(),
        truncate(&job.partition, PARTITION_WIDTH).to_string(),
        truncate(&job.name, NAME_WIDTH).to_string(),
        user.to_string(),
        format_slurm_duration(&job.elapsed),
        job.time_limit
            .as_ref()
            .map(format_slurm_duration)
            .unwrap_or_default(),
        format_timestamp(job.start_time),
        format_timestamp(job.end_time),
        job.priority.to_string(),
        non_zero(job.req_gpus),
        gpu_type,
        gmem_tag,
        non_zero(cpus),
        if mem_mib > 0 {
            format_mem(mem_mib)
        } else {
            String::new()
        },
        node_reason(job),
    ]
}

fn format_timestamp(timestamp: Option<NaiveDateTime>) -> String {
    timestamp
        .map(|t| t.format("%d %b %H:%M").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

fn non_zero(value: i64) -> String {
    if value != 0 {
        value.to_string()
    } else {
        String::new()
    }
}

/// Assigned host plus, while the job is pending, the scheduler's reason.
fn node_reason(job: &RawJob) -> String {
    let reason = match job.state {
        JobState::Pending => job
            .reason
            .as_deref()
            .map(|reason| truncate(reason, REASON_WIDTH)),
        _ => None,
    };
    match (&job.batch_host, reason) {
        (Some(host), Some(reason)) => format!("{host} ({reason})"),
        (Some(host), None) => host.clone(),
        (None, Some(reason)) => format!("({reason})"),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{JobFilter, build_job_listing};
    use crate::cluster::classify::GpuNode;
    use crate::cluster::users::UserTable;
    use crate::common::config::Config;
    use crate::report::blocks::ReportBlock;
    use crate::slurm::records::{MemoryRequest, RawJob};
    use crate::{JobState, Map};
    use std::time::Duration;

    fn job(id: u64, partition: &str, priority: i64) -> RawJob {
        RawJob {
            id,
            user_id: 1234,
            partition: partition.to_string(),
            state: JobState::Running,
            name: format!("train-{id}"),
            batch: true,
            req_gpus: 0,
            batch_host: Some("gpu01".to_string()),
            cpus_allocated: Map::new(),
            memory: MemoryRequest::Unspecified,
            elapsed: Duration::from_secs(3600),
            time_limit: Some(Duration::from_secs(7200)),
            priority,
            reason: None,
            start_time: None,
            end_time: None,
        }
    }

    fn users() -> UserTable {
        [(1234u32, "alice".to_string())].into_iter().collect()
    }

    fn classified() -> Map<String, Vec<GpuNode>> {
        let mut classified = Map::new();
        classified.insert("a6000".to_string(), vec![GpuNode {
            name: "gpu01".to_string(),
            gpu_type: "a6000".to_string(),
            gpu_total: 8,
            gpu_used: 2,
            cpu_total: 32,
            cpu_used: 8,
            mem_total_mib: 262144,
            mem_used_mib: 65536,
            gmem: Some("48G".to_string()),
            partitions: vec!["gpu".to_string()],
            state: "MIXED".to_string(),
        }]);
        classified
    }

    fn filter(state: JobState) -> JobFilter {
        JobFilter { state, user: None }
    }

    #[test]
    fn test_no_matching_jobs() {
        let blocks = build_job_listing(
            &Map::new(),
            &users(),
            &classified(),
            &Config::default(),
            &filter(JobState::Pending),
        );
        assert_eq!(blocks, vec![ReportBlock::Label(
            "No pending jobs!".to_string()
        )]);
    }

    #[test]
    fn test_empty_columns_are_dropped_and_reappear() {
        let mut jobs = Map::new();
        jobs.insert(1, job(1, "gpu", 100));

        let blocks = build_job_listing(
            &jobs,
            &users(),
            &classified(),
            &Config::default(),
            &filter(JobState::Running),
        );
        let header = blocks[0].text().lines().nth(1).unwrap().to_string();
        // no job requests GPUs, so the gpus column vanishes
        assert!(!header.contains("gpus"));
        assert!(header.contains("prio"));

        jobs.get_mut(&1).unwrap().req_gpus = 2;
        let blocks = build_job_listing(
            &jobs,
            &users(),
            &classified(),
            &Config::default(),
            &filter(JobState::Running),
        );
        let header = blocks[0].text().lines().nth(1).unwrap().to_string();
        assert!(header.contains("gpus"));
    }

    #[test]
    fn test_row_sorting() {
        let mut jobs = Map::new();
        jobs.insert(3, job(3, "gpu", 50));
        jobs.insert(1, job(1, "batch", 10));
        jobs.insert(2, job(2, "gpu", 80));

        let blocks = build_job_listing(
            &jobs,
            &users(),
            &classified(),
            &Config::default(),
            &filter(JobState::Running),
        );
        let ids: Vec<String> = blocks[0]
            .text()
            .lines()
            .skip(2)
            .filter(|line| !line.starts_with("```"))
            .map(|line| line.split_whitespace().next().unwrap().to_string())
            .collect();
        // partition ascending, then priority descending
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_pagination() {
        let mut config = Config::default();
        config.jobs_page_size = 2;
        let mut jobs = Map::new();
        for id in 1..=5 {
            jobs.insert(id, job(id, "gpu", 100));
        }

        let blocks = build_job_listing(
            &jobs,
            &users(),
            &classified(),
            &config,
            &filter(JobState::Running),
        );
        // ceil(5 / 2) pages
        assert_eq!(blocks.len(), 3);
        for block in &blocks {
            let lines: Vec<&str> = block.text().lines().collect();
            assert!(lines[1].contains("id"));
            // fences + header + at most two data rows
            assert!(lines.len() <= 5);
        }
    }

    #[test]
    fn test_user_filter() {
        let mut jobs = Map::new();
        jobs.insert(1, job(1, "gpu", 100));
        let mut other = job(2, "gpu", 100);
        other.user_id = 4321;
        jobs.insert(2, other);

        let blocks = build_job_listing(
            &jobs,
            &users(),
            &classified(),
            &Config::default(),
            &JobFilter {
                state: JobState::Running,
                user: Some("alice".to_string()),
            },
        );
        let table = blocks[0].text();
        assert!(table.contains("alice"));
        assert!(!table.contains("4321"));
    }

    #[test]
    fn test_general_partition_excluded() {
        let mut jobs = Map::new();
        jobs.insert(1, job(1, "cpu", 100));

        let blocks = build_job_listing(
            &jobs,
            &users(),
            &classified(),
            &Config::default(),
            &filter(JobState::Running),
        );
        assert_eq!(blocks, vec![ReportBlock::Label(
            "No running jobs!".to_string()
        )]);
    }

    #[test]
    fn test_pending_job_reason_column() {
        let mut jobs = Map::new();
        let mut pending = job(1, "gpu", 100);
        pending.state = JobState::Pending;
        pending.batch_host = None;
        pending.reason = Some("Resources".to_string());
        jobs.insert(1, pending);

        let blocks = build_job_listing(
            &jobs,
            &users(),
            &classified(),
            &Config::default(),
            &filter(JobState::Pending),
        );
        let table = blocks[0].text();
        assert!(table.contains("(Resources)"));
        // unscheduled start renders as N/A
        assert!(table.contains("N/A"));
    }

    #[test]
    fn test_allocated_resources_rendered() {
        let mut jobs = Map::new();
        let mut running = job(1, "gpu", 100);
        running.req_gpus = 2;
        running.cpus_allocated.insert("gpu01".to_string(), 8);
        running.memory = MemoryRequest::PerCpu(1024);
        jobs.insert(1, running);

        let blocks = build_job_listing(
            &jobs,
            &users(),
            &classified(),
            &Config::default(),
            &filter(JobState::Running),
        );
        let row = blocks[0].text().lines().nth(2).unwrap();
        let cells: Vec<&str> = row.split_whitespace().collect();
        // id partition name user elapsed limit start end prio gpus type gmem cpus mem node
        assert_eq!(cells, vec![
            "1",
            "gpu",
            "train-1",
            "alice",
            "01:00:00",
            "02:00:00",
            "N/A",
            "N/A",
            "100",
            "2",
            "a6000",
            "48G",
            "8",
            "2G",
            "gpu01"
        ]);
    }
}
