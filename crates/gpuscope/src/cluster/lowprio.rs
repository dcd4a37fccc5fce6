use std::borrow::Borrow;
use std::ops::AddAssign;

use crate::Map;
use crate::slurm::records::{MemoryRequest, RawJob};

/// Resources claimed on one node, in MiB for memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceClaim {
    pub gpus: i64,
    pub cpus: i64,
    pub mem_mib: i64,
}

impl AddAssign for ResourceClaim {
    fn add_assign(&mut self, other: ResourceClaim) {
        self.gpus += other.gpus;
        self.cpus += other.cpus;
        self.mem_mib += other.mem_mib;
    }
}

/// Per-node resources claimed by one job, reconstructed from its allocation
/// map. GPUs come directly from the per-node request; memory is the per-CPU
/// request times the GPU count, or the flat per-node request.
pub fn job_claims(job: &RawJob) -> Vec<(&str, ResourceClaim)> {
    let mem_mib = match job.memory {
        MemoryRequest::PerCpu(mib) => mib as i64 * job.req_gpus,
        MemoryRequest::PerNode(mib) => mib as i64,
        MemoryRequest::Unspecified => 0,
    };
    job.cpus_allocated
        .iter()
        .map(|(node, cpus)| {
            (
                node.as_str(),
                ResourceClaim {
                    gpus: job.req_gpus,
                    cpus: *cpus,
                    mem_mib,
                },
            )
        })
        .collect()
}

/// Estimates how much capacity the low-priority partition currently holds on
/// each node. The scheduler does not report this directly, so it is
/// reconstructed from job allocation records on every refresh; nodes without
/// such jobs simply have no entry (a zero claim).
pub fn estimate_low_priority<J>(jobs: J, lowpri_partition: &str) -> Map<String, ResourceClaim>
where
    J: IntoIterator,
    J::Item: std::borrow::Borrow<RawJob>,
{
    let mut claims: Map<String, ResourceClaim> = Map::new();
    for job in jobs {
        let job = job.borrow();
        if job.partition != lowpri_partition {
            continue;
        }
        for (node, claim) in job_claims(job) {
            *claims.entry(node.to_string()).or_default() += claim;
        }
    }
    claims
}
