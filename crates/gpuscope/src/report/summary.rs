use std::collections::BTreeSet;

use itertools::Itertools;

use crate::Map;
use crate::cluster::classify::GpuNode;
use crate::cluster::lowprio::ResourceClaim;
use crate::common::config::Config;
use crate::common::format::format_mem_pair;
use crate::common::utils::str::truncate;
use crate::report::blocks::ReportBlock;
use crate::report::table::{Justify, TextTable, merge_widths};

const STATE_WIDTH: usize = 8;

const HEADER: [&str; 10] = [
    "node", "partitions", "gpu", "lp_gpu", "cpu", "lp_cpu", "mem", "lp_mem", "state", "users",
];

const JUSTIFY: [Justify; 10] = [
    Justify::Left,
    Justify::Left,
    Justify::Right,
    Justify::Right,
    Justify::Right,
    Justify::Right,
    Justify::Right,
    Justify::Right,
    Justify::Left,
    Justify::Left,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryOptions {
    /// Drop rows of nodes without a single free GPU.
    pub hide_full: bool,
}

/// Builds the per-accelerator-type cluster overview: one header line plus
/// one node table per type, all tables aligned to the widths of the whole
/// report. Each cell pairs the free (or low-priority) amount with the total.
pub fn build_cluster_summary(
    classified: &Map<String, Vec<GpuNode>>,
    lowpri: &Map<String, ResourceClaim>,
    node_users: &Map<String, BTreeSet<String>>,
    config: &Config,
    options: &SummaryOptions,
) -> Vec<ReportBlock> {
    if classified.is_empty() {
        log::warn!("No Nodes found!");
        return vec![ReportBlock::Label("No Nodes found!".to_string())];
    }

    let mut sections = Vec::new();
    for gpu_type in display_order(classified.keys(), config) {
        let nodes = &classified[&gpu_type];
        let mut nodes: Vec<&GpuNode> = nodes.iter().collect();
        nodes.sort_by(|a, b| {
            let a_partitions = a.partitions.join(",");
            let b_partitions = b.partitions.join(",");
            b_partitions
                .cmp(&a_partitions)
                .then_with(|| b.gpu_free().cmp(&a.gpu_free()))
                .then_with(|| claim_of(lowpri, b).gpus.cmp(&claim_of(lowpri, a).gpus))
                .then_with(|| a.name.cmp(&b.name))
        });

        let mut table = TextTable::new(
            HEADER.iter().map(|h| h.to_string()).collect(),
            JUSTIFY.to_vec(),
        );
        let mut previous_partitions: Option<&Vec<String>> = None;
        for node in &nodes {
            if options.hide_full && node.gpu_free() == 0 {
                continue;
            }
            if let Some(previous) = previous_partitions {
                if previous != &node.partitions {
                    table.push_divider();
                }
            }
            previous_partitions = Some(&node.partitions);
            table.push_row(node_row(node, &claim_of(lowpri, node), node_users));
        }

        sections.push((type_header(&gpu_type, &nodes, lowpri), table));
    }

    let mut widths = vec![0; HEADER.len()];
    for (_, table) in &sections {
        merge_widths(&mut widths, &table.widths());
    }

    let mut blocks = Vec::with_capacity(sections.len() * 2);
    for (label, table) in sections {
        blocks.push(ReportBlock::Label(label));
        blocks.push(ReportBlock::Table(table.render_with(&widths)));
    }
    blocks
}

/// Unknown accelerator types come first in lexicographic order, then the
/// configured new-generation classes, then the legacy ones.
fn display_order<'a>(
    types: impl Iterator<Item = &'a String>,
    config: &Config,
) -> Vec<String> {
    let present: BTreeSet<String> = types.cloned().collect();
    let known: Vec<&str> = config
        .new_gpu_display_order
        .iter()
        .chain(config.old_gpu_display_order.iter())
        .map(String::as_str)
        .collect();
    let mut order: Vec<String> = present
        .iter()
        .filter(|gpu_type| !known.contains(&gpu_type.as_str()))
        .cloned()
        .collect();
    order.extend(
        known
            .iter()
            .filter(|gpu_type| present.contains(**gpu_type))
            .map(|gpu_type| gpu_type.to_string()),
    );
    order
}

fn claim_of(lowpri: &Map<String, ResourceClaim>, node: &GpuNode) -> ResourceClaim {
    lowpri.get(&node.name).copied().unwrap_or_default()
}

fn node_row(
    node: &GpuNode,
    claim: &ResourceClaim,
    node_users: &Map<String, BTreeSet<String>>,
) -> Vec<String> {
    let users = node_users
        .get(&node.name)
        .filter(|users| !users.is_empty())
        .map(|users| users.iter().join(","))
        .unwrap_or_else(|| "--".to_string());
    vec![
        node.name.clone(),
        node.partitions.join(","),
        format!("{}/{}", node.gpu_free(), node.gpu_total),
        format!("{}/{}", claim.gpus, node.gpu_total),
        format!("{}/{}", node.cpu_free(), node.cpu_total),
        format!("{}/{}", claim.cpus, node.cpu_total),
        format_mem_pair(node.mem_free_mib(), node.mem_total_mib),
        format_mem_pair(claim.mem_mib, node.mem_total_mib),
        truncate(&node.state, STATE_WIDTH).to_string(),
        users,
    ]
}

/// One-line header per accelerator type: name, memory tag and the free and
/// low-priority aggregates over every node of the type (hidden rows
/// included).
fn type_header(
    gpu_type: &str,
    nodes: &[&GpuNode],
    lowpri: &Map<String, ResourceClaim>,
) -> String {
    let total: i64 = nodes.iter().map(|node| node.gpu_total).sum();
    let free: i64 = nodes.iter().map(|node| node.gpu_free()).sum();
    let claimed: i64 = nodes.iter().map(|node| claim_of(lowpri, node).gpus).sum();
    let gmem = nodes
        .iter()
        .find_map(|node| node.gmem.as_deref())
        .map(|tag| format!(" [{tag}]"))
        .unwrap_or_default();
    format!("*{gpu_type}*{gmem}  Free: {free}/{total}  Low Priority: {claimed}/{total}")
}

#[cfg(test)]
mod tests {
    use super::{SummaryOptions, build_cluster_summary, display_order};
    use crate::cluster::classify::GpuNode;
    use crate::cluster::lowprio::ResourceClaim;
    use crate::common::config::Config;
    use crate::report::blocks::ReportBlock;
    use crate::{Map, Set};
    use std::collections::BTreeSet;

    fn gpu_node(name: &str, gpu_type: &str, total: i64, used: i64) -> GpuNode {
        GpuNode {
            name: name.to_string(),
            gpu_type: gpu_type.to_string(),
            gpu_total: total,
            gpu_used: used,
            cpu_total: 32,
            cpu_used: 8,
            mem_total_mib: 262144,
            mem_used_mib: 65536,
            gmem: Some("48G".to_string()),
            partitions: vec!["gpu".to_string()],
            state: "MIXED".to_string(),
        }
    }

    fn classified_single() -> Map<String, Vec<GpuNode>> {
        let mut classified = Map::new();
        classified.insert("a6000".to_string(), vec![gpu_node("gpu01", "a6000", 8, 2)]);
        classified
    }

    #[test]
    fn test_empty_inventory() {
        let blocks = build_cluster_summary(
            &Map::new(),
            &Map::new(),
            &Map::new(),
            &Config::default(),
            &SummaryOptions::default(),
        );
        assert_eq!(blocks, vec![ReportBlock::Label("No Nodes found!".into())]);
    }

    #[test]
    fn test_type_header_aggregates() {
        let blocks = build_cluster_summary(
            &classified_single(),
            &Map::new(),
            &Map::new(),
            &Config::default(),
            &SummaryOptions::default(),
        );
        assert_eq!(
            blocks[0],
            ReportBlock::Label("*a6000* [48G]  Free: 6/8  Low Priority: 0/8".into())
        );
        let ReportBlock::Table(table) = &blocks[1] else {
            panic!("expected a table block");
        };
        assert!(table.contains("6/8"));
        assert!(table.contains("192/256G"));
        assert!(table.contains("--"));
    }

    #[test]
    fn test_node_sort_and_dividers() {
        let mut nodes = vec![
            gpu_node("b01", "a6000", 8, 8),
            gpu_node("a02", "a6000", 8, 2),
            gpu_node("a01", "a6000", 8, 2),
        ];
        // one node sits in a different partition set
        nodes[0].partitions = vec!["gpu".to_string(), "lowpri".to_string()];
        let mut classified = Map::new();
        classified.insert("a6000".to_string(), nodes);

        let blocks = build_cluster_summary(
            &classified,
            &Map::new(),
            &Map::new(),
            &Config::default(),
            &SummaryOptions::default(),
        );
        let table = blocks[1].text();
        let lines: Vec<&str> = table.lines().collect();
        // "gpu,lowpri" sorts before "gpu" (descending), divider separates them;
        // equal free counts fall back to the name
        assert!(lines[2].starts_with("b01"));
        assert!(lines[3].starts_with('-'));
        assert!(lines[4].starts_with("a01"));
        assert!(lines[5].starts_with("a02"));
    }

    #[test]
    fn test_hide_full_nodes() {
        let mut classified = classified_single();
        classified
            .get_mut("a6000")
            .unwrap()
            .push(gpu_node("gpu02", "a6000", 8, 8));

        let blocks = build_cluster_summary(
            &classified,
            &Map::new(),
            &Map::new(),
            &Config::default(),
            &SummaryOptions { hide_full: true },
        );
        let table = blocks[1].text();
        assert!(!table.contains("gpu02"));
        // aggregates still count the hidden node
        assert_eq!(
            blocks[0].text(),
            "*a6000* [48G]  Free: 6/16  Low Priority: 0/16"
        );
    }

    #[test]
    fn test_lowpri_claims_rendered() {
        let mut lowpri = Map::new();
        lowpri.insert(
            "gpu01".to_string(),
            ResourceClaim {
                gpus: 2,
                cpus: 8,
                mem_mib: 16384,
            },
        );
        let mut node_users = Map::new();
        node_users.insert(
            "gpu01".to_string(),
            BTreeSet::from(["bob".to_string(), "alice".to_string()]),
        );

        let blocks = build_cluster_summary(
            &classified_single(),
            &lowpri,
            &node_users,
            &Config::default(),
            &SummaryOptions::default(),
        );
        assert_eq!(
            blocks[0].text(),
            "*a6000* [48G]  Free: 6/8  Low Priority: 2/8"
        );
        let table = blocks[1].text();
        assert!(table.contains("2/8"));
        assert!(table.contains("16/256G"));
        assert!(table.contains("alice,bob"));
    }

    #[test]
    fn test_display_order() {
        let config = Config::default();
        let types: Vec<String> = ["m40", "a6000", "titanxp", "a40"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let order = display_order(types.iter(), &config);
        // unknown first, then configured new-generation order, legacy last
        assert_eq!(order, vec!["titanxp", "a6000", "a40", "m40"]);
    }

    #[test]
    fn test_blocks_align_across_types() {
        let mut classified = classified_single();
        classified.insert(
            "a40".to_string(),
            vec![gpu_node("verylongnodename42", "a40", 4, 0)],
        );
        let blocks = build_cluster_summary(
            &classified,
            &Map::new(),
            &Map::new(),
            &Config::default(),
            &SummaryOptions::default(),
        );
        let widths: Set<usize> = blocks
            .iter()
            .filter(|block| matches!(block, ReportBlock::Table(_)))
            .map(|block| {
                block
                    .text()
                    .lines()
                    .nth(1)
                    .map(|line| line.len())
                    .unwrap_or(0)
            })
            .collect();
        // header lines of every type block share one layout
        assert_eq!(widths.len(), 1);
    }

    #[test]
    fn test_determinism() {
        let classified = classified_single();
        let config = Config::default();
        let build = || {
            build_cluster_summary(
                &classified,
                &Map::new(),
                &Map::new(),
                &config,
                &SummaryOptions::default(),
            )
        };
        assert_eq!(build(), build());
    }
}
