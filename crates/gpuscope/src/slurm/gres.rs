use nom::bytes::complete::take_while1;
use nom::character::complete::char;
use nom::combinator::{map, opt};
use nom::sequence::{preceded, terminated, tuple};
use nom_supreme::ParserExt;

use crate::common::parser::{NomResult, consume_all, p_u64};

/// One parsed GRES resource descriptor, e.g. `gpu:a6000:8(S:0-1)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GresDescriptor {
    pub class: String,
    pub kind: String,
    pub count: i64,
}

fn p_ident(input: &str) -> NomResult<&str> {
    take_while1(|c: char| c != ':' && c != '(' && c != ')')(input)
}

fn p_gres_descriptor(input: &str) -> NomResult<GresDescriptor> {
    map(
        tuple((
            p_ident.context("resource class"),
            preceded(char(':'), p_ident).context("accelerator type"),
            preceded(char(':'), p_u64).context("device count"),
            opt(preceded(
                char('('),
                terminated(take_while1(|c| c != ')'), char(')')),
            )),
        )),
        |(class, kind, count, _suffix)| GresDescriptor {
            class: class.to_string(),
            kind: kind.to_string(),
            count: count as i64,
        },
    )(input)
}

/// Parses a `<class>:<type>:<count>[(<suffix>)]` resource descriptor.
pub fn parse_gres_descriptor(input: &str) -> anyhow::Result<GresDescriptor> {
    consume_all(p_gres_descriptor, input)
}

/// Splits a scheduler-side descriptor list on commas that are outside
/// parentheses; `GresUsed=gpu:a6000:2(IDX:0,1)` is a single descriptor.
pub fn split_descriptors(value: &str) -> Vec<&str> {
    if value.is_empty() || value == "(null)" {
        return Vec::new();
    }
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, c) in value.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&value[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    items.push(&value[start..]);
    items.retain(|item| !item.is_empty());
    items
}

/// Extracts the accelerator-memory-size tag from a node feature string,
/// e.g. `intel,gmem48G,ib` -> `48G`.
pub fn parse_gmem_tag(features: &str) -> Option<String> {
    for feature in features.split(',') {
        if let Some(rest) = feature.trim().strip_prefix("gmem") {
            if let Some(digits) = rest.strip_suffix('G') {
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Some(format!("{digits}G"));
                }
            }
        }
    }
    None
}

/// Number of GPUs a job requests per node, from a `TresPerNode` value such
/// as `gres/gpu:2`, `gres/gpu:a40:2` or bare `gres/gpu` (one device).
pub fn gpus_per_node(tres: &str) -> Option<i64> {
    for entry in tres.split(',') {
        let resource = entry.trim();
        let resource = resource.strip_prefix("gres/").unwrap_or(resource);
        let Some(rest) = resource.strip_prefix("gpu") else {
            continue;
        };
        return match rest.strip_prefix(':') {
            None if rest.is_empty() => Some(1),
            None => continue,
            Some(tail) => {
                let count = tail.rsplit(':').next().unwrap_or(tail);
                Some(count.parse::<i64>().unwrap_or(1))
            }
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{gpus_per_node, parse_gmem_tag, parse_gres_descriptor, split_descriptors};

    #[test]
    fn test_parse_descriptor() {
        let descriptor = parse_gres_descriptor("gpu:a6000:8").unwrap();
        assert_eq!(descriptor.class, "gpu");
        assert_eq!(descriptor.kind, "a6000");
        assert_eq!(descriptor.count, 8);
    }

    #[test]
    fn test_parse_descriptor_with_suffix() {
        let descriptor = parse_gres_descriptor("gpu:a6000:2(IDX:0,1)").unwrap();
        assert_eq!(descriptor.count, 2);

        let descriptor = parse_gres_descriptor("gpu:rtx8k:8(S:0-1)").unwrap();
        assert_eq!(descriptor.kind, "rtx8k");
    }

    #[test]
    fn test_parse_descriptor_malformed() {
        assert!(parse_gres_descriptor("gpu:8").is_err());
        assert!(parse_gres_descriptor("gpu:a6000:many").is_err());
        assert!(parse_gres_descriptor("").is_err());
        assert!(parse_gres_descriptor("gpu:a6000:8trailing").is_err());
    }

    #[test]
    fn test_split_descriptors() {
        assert_eq!(
            split_descriptors("gpu:a6000:8(S:0-1),tmp:scratch:100"),
            vec!["gpu:a6000:8(S:0-1)", "tmp:scratch:100"]
        );
        // comma inside the suffix is not a separator
        assert_eq!(
            split_descriptors("gpu:a6000:2(IDX:0,1)"),
            vec!["gpu:a6000:2(IDX:0,1)"]
        );
        assert!(split_descriptors("(null)").is_empty());
        assert!(split_descriptors("").is_empty());
    }

    #[test]
    fn test_gmem_tag() {
        assert_eq!(
            parse_gmem_tag("intel,gmem48G,ib").as_deref(),
            Some("48G")
        );
        assert_eq!(parse_gmem_tag("gmem24G").as_deref(), Some("24G"));
        assert_eq!(parse_gmem_tag("intel,ib"), None);
        assert_eq!(parse_gmem_tag("gmemXL"), None);
        assert_eq!(parse_gmem_tag(""), None);
    }

    #[test]
    fn test_gpus_per_node() {
        assert_eq!(gpus_per_node("gres/gpu:2"), Some(2));
        assert_eq!(gpus_per_node("gres/gpu:a40:4"), Some(4));
        assert_eq!(gpus_per_node("gres/gpu"), Some(1));
        assert_eq!(gpus_per_node("gres/gpu:a40"), Some(1));
        assert_eq!(gpus_per_node("gres/fpga:2"), None);
        assert_eq!(gpus_per_node(""), None);
    }
}
