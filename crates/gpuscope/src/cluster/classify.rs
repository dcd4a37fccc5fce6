use crate::Map;
use crate::slurm::gres::{parse_gmem_tag, parse_gres_descriptor};
use crate::slurm::records::RawNode;

/// A GPU node with its accelerator descriptor resolved and capacities ready
/// for reporting. `used <= total` is not enforced: scheduler data can be
/// transiently inconsistent and a negative free count is displayed as such.
#[derive(Debug, Clone)]
pub struct GpuNode {
    pub name: String,
    pub gpu_type: String,
    pub gpu_total: i64,
    pub gpu_used: i64,
    pub cpu_total: i64,
    pub cpu_used: i64,
    pub mem_total_mib: i64,
    pub mem_used_mib: i64,
    pub gmem: Option<String>,
    pub partitions: Vec<String>,
    pub state: String,
}

impl GpuNode {
    pub fn gpu_free(&self) -> i64 {
        self.gpu_total - self.gpu_used
    }

    pub fn cpu_free(&self) -> i64 {
        self.cpu_total - self.cpu_used
    }

    pub fn mem_free_mib(&self) -> i64 {
        self.mem_total_mib - self.mem_used_mib
    }
}

/// Groups the node inventory by accelerator type. Nodes without a GPU
/// resource line are skipped; a node advertising several GPU lines is used
/// with its first one only.
pub fn classify_nodes(nodes: &Map<String, RawNode>) -> Map<String, Vec<GpuNode>> {
    let mut grouped: Map<String, Vec<GpuNode>> = Map::new();
    for (name, node) in nodes {
        let descriptors: Vec<_> = node
            .gres
            .iter()
            .filter_map(|entry| match parse_gres_descriptor(entry) {
                Ok(descriptor) if descriptor.class == "gpu" => Some(descriptor),
                Ok(_) => None,
                Err(error) => {
                    log::warn!("Cannot parse GRES '{entry}' of node {name}: {error:?}");
                    None
                }
            })
            .collect();
        let Some(descriptor) = descriptors.first() else {
            continue;
        };
        if descriptors.len() > 1 {
            log::warn!(
                "Node {name} advertises {} GPU resource lines, using {}:{}",
                descriptors.len(),
                descriptor.kind,
                descriptor.count
            );
        }

        let gpu_used = node
            .gres_used
            .iter()
            .filter_map(|entry| parse_gres_descriptor(entry).ok())
            .find(|used| used.class == "gpu" && used.kind == descriptor.kind)
            .map(|used| used.count)
            .unwrap_or(0);

        grouped
            .entry(descriptor.kind.clone())
            .or_default()
            .push(GpuNode {
                name: name.clone(),
                gpu_type: descriptor.kind.clone(),
                gpu_total: descriptor.count,
                gpu_used,
                cpu_total: node.cpu_total,
                cpu_used: node.cpu_used,
                mem_total_mib: node.mem_total_mib,
                mem_used_mib: node.mem_used_mib,
                gmem: parse_gmem_tag(&node.features),
                partitions: node.partitions.clone(),
                state: node.state.clone(),
            });
    }
    grouped
}

/// Node name -> accelerator type, for resolving which class a job runs on.
pub fn node_types(classified: &Map<String, Vec<GpuNode>>) -> Map<String, String> {
    let mut types = Map::new();
    for (gpu_type, nodes) in classified {
        for node in nodes {
            types.insert(node.name.clone(), gpu_type.clone());
        }
    }
    types
}

/// Accelerator type -> memory-size tag. When nodes of one type disagree, the
/// tag of the first node in name order wins.
pub fn gmem_by_type(classified: &Map<String, Vec<GpuNode>>) -> Map<String, String> {
    let mut tags = Map::new();
    for (gpu_type, nodes) in classified {
        let mut nodes: Vec<&GpuNode> = nodes.iter().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(tag) = nodes.iter().find_map(|node| node.gmem.clone()) {
            tags.insert(gpu_type.clone(), tag);
        }
    }
    tags
}
