/// `<key>=<value>` items of one `scontrol` record, in output order.
///
/// Keys may repeat: `scontrol show job --detail` emits one `Nodes=...
/// CPU_IDs=... Mem=...` group per allocated node chunk in addition to the
/// job-level keys, so the order-preserving representation is kept and
/// callers that only need scalars collapse it into a map themselves.
pub type StanzaItems<'a> = Vec<(&'a str, &'a str)>;

/// Splits `scontrol` output into per-record item lists. A new record starts
/// at every occurrence of `leading_key` (`NodeName` for nodes, `JobId` for
/// jobs); anything before the first one is ignored, which also covers the
/// "No jobs in the system" message.
pub fn split_records<'a>(output: &'a str, leading_key: &str) -> Vec<StanzaItems<'a>> {
    let mut records = Vec::new();
    let mut current: Option<StanzaItems<'a>> = None;
    for line in output.lines() {
        for item in line.trim().split_whitespace() {
            let Some((key, value)) = item.split_once('=') else {
                continue;
            };
            if key == leading_key {
                records.extend(current.take());
                current = Some(Vec::new());
            }
            if let Some(record) = current.as_mut() {
                record.push((key, value));
            }
        }
    }
    records.extend(current);
    records
}

#[cfg(test)]
mod tests {
    use super::split_records;

    #[test]
    fn test_split_multiline_records() {
        let output = "NodeName=gpu01 State=IDLE\n   CPUTot=32\nNodeName=gpu02 State=MIXED\n";
        let records = split_records(output, "NodeName");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], vec![
            ("NodeName", "gpu01"),
            ("State", "IDLE"),
            ("CPUTot", "32")
        ]);
        assert_eq!(records[1], vec![("NodeName", "gpu02"), ("State", "MIXED")]);
    }

    #[test]
    fn test_split_oneliner_records() {
        let output = "JobId=1 JobState=RUNNING\nJobId=2 JobState=PENDING\n";
        let records = split_records(output, "JobId");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1][0], ("JobId", "2"));
    }

    #[test]
    fn test_split_keeps_repeated_keys() {
        let output = "JobId=1 Nodes=gpu01 CPU_IDs=0-3 Nodes=gpu02 CPU_IDs=4-7\n";
        let records = split_records(output, "JobId");
        let nodes: Vec<_> = records[0]
            .iter()
            .filter(|(key, _)| *key == "Nodes")
            .collect();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_split_ignores_preamble() {
        let records = split_records("No jobs in the system", "JobId");
        assert!(records.is_empty());
    }

    #[test]
    fn test_split_value_with_equals_sign() {
        let records = split_records("NodeName=gpu01 Comment=key=value", "NodeName");
        assert_eq!(records[0][1], ("Comment", "key=value"));
    }
}
