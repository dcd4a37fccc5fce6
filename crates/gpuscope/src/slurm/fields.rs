use std::time::Duration;

use anyhow::{Context, bail};
use nom::character::complete::char;
use nom::combinator::{map, opt};
use nom::multi::separated_list1;
use nom::sequence::{preceded, tuple};
use nom_supreme::ParserExt;

use crate::common::parser::{NomResult, consume_all, p_u32};
use crate::common::utils::time::parse_hms_time;

/// Format a duration as a SLURM time string, e.g. 01:05:02
pub fn format_slurm_duration(duration: &Duration) -> String {
    let mut seconds = duration.as_secs();
    let hours = seconds / 3600;
    seconds %= 3600;
    let minutes = seconds / 60;
    seconds %= 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Parses a SLURM duration, either `HH:MM:SS` or `D-HH:MM:SS`.
pub fn parse_slurm_duration(value: &str) -> anyhow::Result<Duration> {
    if let Some(p) = value.find('-') {
        let days: u64 = value[..p].parse().context("Invalid day count")?;
        let time = parse_hms_time(&value[p + 1..])?;
        Ok(time + Duration::from_secs(days * 24 * 3600))
    } else {
        parse_hms_time(value)
    }
}

pub fn parse_slurm_datetime(datetime: &str) -> anyhow::Result<chrono::NaiveDateTime> {
    Ok(chrono::NaiveDateTime::parse_from_str(
        datetime,
        "%Y-%m-%dT%H:%M:%S",
    )?)
}

/// Parses a scheduler memory amount into MiB. Values carry an optional
/// binary suffix (`1900M`, `32G`, `2T`); a bare number is already MiB.
pub fn parse_mem_mib(value: &str) -> anyhow::Result<u64> {
    let value = value.trim();
    if value.is_empty() {
        bail!("Empty memory amount");
    }
    let (number, factor) = match value.chars().last() {
        Some('K') | Some('k') => (&value[..value.len() - 1], 1.0 / 1024.0),
        Some('M') | Some('m') => (&value[..value.len() - 1], 1.0),
        Some('G') | Some('g') => (&value[..value.len() - 1], 1024.0),
        Some('T') | Some('t') => (&value[..value.len() - 1], 1024.0 * 1024.0),
        _ => (value, 1.0),
    };
    let amount: f64 = number
        .parse()
        .with_context(|| format!("Invalid memory amount '{value}'"))?;
    Ok((amount * factor) as u64)
}

fn p_id_range(input: &str) -> NomResult<i64> {
    map(
        tuple((p_u32, opt(preceded(char('-'), p_u32)))).context("CPU id range"),
        |(from, to)| match to {
            Some(to) => (to as i64 - from as i64 + 1).max(0),
            None => 1,
        },
    )(input)
}

/// Counts the ids in a `CPU_IDs` range list, e.g. `0-7,16-23` -> 16.
pub fn count_cpu_ids(input: &str) -> anyhow::Result<i64> {
    consume_all(
        map(separated_list1(char(','), p_id_range), |counts| {
            counts.iter().sum()
        }),
        input,
    )
}

/// Expands a compact SLURM hostlist expression, e.g. `cn[01-03,07]` ->
/// `cn01, cn02, cn03, cn07`. Plain host names pass through; numeric
/// zero-padding of the range start is preserved.
pub fn expand_hostlist(value: &str) -> anyhow::Result<Vec<String>> {
    let Some(open) = value.find('[') else {
        if value.contains(']') {
            bail!("Unbalanced brackets in hostlist '{value}'");
        }
        return Ok(vec![value.to_string()]);
    };
    let Some(close) = value.rfind(']') else {
        bail!("Unbalanced brackets in hostlist '{value}'");
    };
    let prefix = &value[..open];
    let suffix = &value[close + 1..];
    let mut hosts = Vec::new();
    for part in value[open + 1..close].split(',') {
        match part.split_once('-') {
            Some((from, to)) => {
                let width = from.len();
                let from: u64 = from
                    .parse()
                    .with_context(|| format!("Invalid hostlist range in '{value}'"))?;
                let to: u64 = to
                    .parse()
                    .with_context(|| format!("Invalid hostlist range in '{value}'"))?;
                if to < from {
                    bail!("Descending hostlist range in '{value}'");
                }
                for number in from..=to {
                    hosts.push(format!("{prefix}{number:0width$}{suffix}"));
                }
            }
            None => {
                if part.is_empty() {
                    bail!("Empty hostlist item in '{value}'");
                }
                hosts.push(format!("{prefix}{part}{suffix}"));
            }
        }
    }
    Ok(hosts)
}
