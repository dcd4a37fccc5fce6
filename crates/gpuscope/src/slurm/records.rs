use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::slurm::fields::{
    count_cpu_ids, expand_hostlist, parse_mem_mib, parse_slurm_datetime, parse_slurm_duration,
};
use crate::slurm::gres::{gpus_per_node, split_descriptors};
use crate::slurm::stanza::{StanzaItems, split_records};
use crate::{JobId, JobState, Map, UserId};

/// A node as reported by the scheduler, decoded at the ingestion boundary.
/// Memory amounts are MiB. Unknown keys in the record are ignored; a missing
/// required key fails the decode of the whole fetch, which the snapshot
/// cache treats as a transient query failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNode {
    pub name: String,
    pub gres: Vec<String>,
    pub gres_used: Vec<String>,
    pub cpu_total: i64,
    pub cpu_used: i64,
    pub mem_total_mib: i64,
    pub mem_used_mib: i64,
    pub features: String,
    pub partitions: Vec<String>,
    pub state: String,
}

/// A job as reported by the scheduler. `cpus_allocated` maps each allocated
/// node to its CPU count, reconstructed from the `--detail` allocation
/// groups; it is the basis of the low-priority reservation estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawJob {
    pub id: JobId,
    pub user_id: UserId,
    pub partition: String,
    pub state: JobState,
    pub name: String,
    /// False for jobs submitted without a batch script (interactive shells).
    pub batch: bool,
    pub req_gpus: i64,
    pub batch_host: Option<String>,
    pub cpus_allocated: Map<String, i64>,
    pub memory: MemoryRequest,
    pub elapsed: Duration,
    pub time_limit: Option<Duration>,
    pub priority: i64,
    pub reason: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MemoryRequest {
    /// MiB per allocated CPU.
    PerCpu(u64),
    /// Flat MiB per allocated node.
    PerNode(u64),
    #[default]
    Unspecified,
}

fn scalar_items<'a>(items: &StanzaItems<'a>) -> Map<&'a str, &'a str> {
    let mut map = Map::with_capacity(items.len());
    for (key, value) in items {
        // first occurrence wins; repeated keys belong to allocation groups
        map.entry(*key).or_insert(*value);
    }
    map
}

fn null_to_none<'a>(value: Option<&'a str>) -> Option<&'a str> {
    value.filter(|v| !v.is_empty() && *v != "(null)" && *v != "None" && *v != "N/A")
}

impl RawNode {
    pub fn from_items(items: &StanzaItems) -> anyhow::Result<RawNode> {
        let map = scalar_items(items);
        let get = |key: &str| -> anyhow::Result<&str> {
            map.get(key)
                .copied()
                .ok_or_else(|| anyhow!("Missing key {} in node record", key))
        };
        let name = get("NodeName")?.to_string();
        let parse_int = |key: &str, value: &str| -> anyhow::Result<i64> {
            value
                .parse()
                .with_context(|| format!("Invalid {key} value '{value}' of node {name}"))
        };

        let gres = split_descriptors(map.get("Gres").copied().unwrap_or(""))
            .into_iter()
            .map(str::to_string)
            .collect();
        let gres_used = split_descriptors(map.get("GresUsed").copied().unwrap_or(""))
            .into_iter()
            .map(str::to_string)
            .collect();
        let cpu_total = parse_int("CPUTot", get("CPUTot")?)?;
        let cpu_used = parse_int("CPUAlloc", get("CPUAlloc")?)?;
        let mem_total_mib = parse_int("RealMemory", get("RealMemory")?)?;
        let mem_used_mib = parse_int("AllocMem", map.get("AllocMem").copied().unwrap_or("0"))?;
        let features = null_to_none(map.get("ActiveFeatures").copied())
            .or_else(|| null_to_none(map.get("AvailableFeatures").copied()))
            .unwrap_or("")
            .to_string();
        let mut partitions: Vec<String> = null_to_none(map.get("Partitions").copied())
            .map(|value| value.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        partitions.sort();
        let state = get("State")?.to_string();

        Ok(RawNode {
            name,
            gres,
            gres_used,
            cpu_total,
            cpu_used,
            mem_total_mib,
            mem_used_mib,
            features,
            partitions,
            state,
        })
    }
}

impl RawJob {
    pub fn from_items(items: &StanzaItems) -> anyhow::Result<RawJob> {
        let map = scalar_items(items);
        let get = |key: &str| -> anyhow::Result<&str> {
            map.get(key)
                .copied()
                .ok_or_else(|| anyhow!("Missing key {} in job record", key))
        };

        let id_value = get("JobId")?;
        let id: JobId = id_value
            .parse()
            .with_context(|| format!("Invalid job id '{id_value}'"))?;
        let user_id = parse_user_id(get("UserId")?)
            .with_context(|| format!("Invalid UserId of job {id}"))?;
        let state = JobState::parse(get("JobState")?);
        let partition = get("Partition")?.to_string();
        let name = map.get("JobName").copied().unwrap_or("").to_string();
        let batch = map.get("BatchFlag").map(|v| *v != "0").unwrap_or(true);
        let req_gpus = map
            .get("TresPerNode")
            .and_then(|v| gpus_per_node(v))
            .unwrap_or(0);
        let batch_host = null_to_none(map.get("BatchHost").copied()).map(str::to_string);
        let priority = map.get("Priority").and_then(|v| v.parse().ok()).unwrap_or(0);
        let reason = null_to_none(map.get("Reason").copied()).map(str::to_string);
        let elapsed = map
            .get("RunTime")
            .and_then(|v| parse_slurm_duration(v).ok())
            .unwrap_or_default();
        let time_limit = map
            .get("TimeLimit")
            .and_then(|v| parse_slurm_duration(v).ok());
        let start_time =
            null_to_none(map.get("StartTime").copied()).and_then(|v| parse_slurm_datetime(v).ok());
        let end_time =
            null_to_none(map.get("EndTime").copied()).and_then(|v| parse_slurm_datetime(v).ok());

        let memory = if let Some(value) = null_to_none(map.get("MinMemoryCPU").copied()) {
            MemoryRequest::PerCpu(
                parse_mem_mib(value).with_context(|| format!("MinMemoryCPU of job {id}"))?,
            )
        } else if let Some(value) = null_to_none(map.get("MinMemoryNode").copied()) {
            MemoryRequest::PerNode(
                parse_mem_mib(value).with_context(|| format!("MinMemoryNode of job {id}"))?,
            )
        } else {
            MemoryRequest::Unspecified
        };

        let cpus_allocated = decode_allocation_groups(items)
            .with_context(|| format!("Invalid allocation records of job {id}"))?;

        Ok(RawJob {
            id,
            user_id,
            partition,
            state,
            name,
            batch,
            req_gpus,
            batch_host,
            cpus_allocated,
            memory,
            elapsed,
            time_limit,
            priority,
            reason,
            start_time,
            end_time,
        })
    }
}

/// `UserId` is reported as `name(uid)`; only the numeric id is kept, account
/// names are resolved through the cached identity table.
fn parse_user_id(value: &str) -> anyhow::Result<UserId> {
    let numeric = match value.split_once('(') {
        Some((_, rest)) => rest.trim_end_matches(')'),
        None => value,
    };
    numeric
        .parse()
        .map_err(|_| anyhow!("Cannot parse user id from '{value}'"))
}

/// Walks the ordered items of a `--detail` job record and accumulates the
/// `Nodes=... CPU_IDs=...` allocation groups into a node -> CPU count map.
fn decode_allocation_groups(items: &StanzaItems) -> anyhow::Result<Map<String, i64>> {
    let mut allocated: Map<String, i64> = Map::new();
    let mut pending_hosts: Vec<String> = Vec::new();
    for (key, value) in items {
        match *key {
            "Nodes" => {
                pending_hosts = match null_to_none(Some(*value)) {
                    Some(hosts) => expand_hostlist(hosts)?,
                    None => Vec::new(),
                };
            }
            "CPU_IDs" => {
                let count = count_cpu_ids(value)?;
                for host in pending_hosts.drain(..) {
                    *allocated.entry(host).or_default() += count;
                }
            }
            _ => {}
        }
    }
    Ok(allocated)
}

pub fn decode_nodes(output: &str) -> anyhow::Result<Map<String, RawNode>> {
    let mut nodes = Map::new();
    for items in split_records(output, "NodeName") {
        let node = RawNode::from_items(&items)?;
        nodes.insert(node.name.clone(), node);
    }
    Ok(nodes)
}

pub fn decode_jobs(output: &str) -> anyhow::Result<Map<JobId, RawJob>> {
    let mut jobs = Map::new();
    for items in split_records(output, "JobId") {
        let job = RawJob::from_items(&items)?;
        jobs.insert(job.id, job);
    }
    Ok(jobs)
}
