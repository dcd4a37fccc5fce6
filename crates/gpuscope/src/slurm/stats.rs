use serde::{Deserialize, Serialize};

/// Scheduler-wide job counters parsed from `sdiag` output. Counters are
/// cumulative since the last scheduler counter rollover; a missing line
/// simply leaves its counter at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdiagStats {
    pub jobs_submitted: i64,
    pub jobs_started: i64,
    pub jobs_completed: i64,
    pub jobs_canceled: i64,
    pub jobs_failed: i64,
    pub jobs_pending: i64,
    pub jobs_running: i64,
}

pub fn parse_sdiag(output: &str) -> SdiagStats {
    let mut stats = SdiagStats::default();
    for line in output.lines() {
        let line = line.trim();
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<i64>() else {
            continue;
        };
        match label.trim() {
            "Jobs submitted" => stats.jobs_submitted = value,
            "Jobs started" => stats.jobs_started = value,
            "Jobs completed" => stats.jobs_completed = value,
            "Jobs canceled" => stats.jobs_canceled = value,
            "Jobs failed" => stats.jobs_failed = value,
            "Jobs pending" => stats.jobs_pending = value,
            "Jobs running" => stats.jobs_running = value,
            _ => {}
        }
    }
    stats
}

impl SdiagStats {
    /// One-line report header, e.g.
    /// `Scheduler: 12 running / 3 pending / 140 submitted since rollover`.
    pub fn summary_line(&self) -> String {
        format!(
            "Scheduler: {} running / {} pending / {} submitted since rollover",
            self.jobs_running, self.jobs_pending, self.jobs_submitted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::parse_sdiag;

    const SDIAG_OUTPUT: &str = "*******************************************************
sdiag output at Mon May 06 10:00:00 2024 (1714989600)
Data since      Mon May 06 00:00:00 2024 (1714953600)
*******************************************************
Server thread count:  3
Jobs submitted: 140
Jobs started:   120
Jobs completed: 100
Jobs canceled:  5
Jobs failed:    2
Jobs pending:   3
Jobs running:   12
";

    #[test]
    fn test_parse_sdiag() {
        let stats = parse_sdiag(SDIAG_OUTPUT);
        assert_eq!(stats.jobs_submitted, 140);
        assert_eq!(stats.jobs_started, 120);
        assert_eq!(stats.jobs_running, 12);
        assert_eq!(stats.jobs_pending, 3);
    }

    #[test]
    fn test_parse_sdiag_empty() {
        assert_eq!(parse_sdiag(""), Default::default());
    }

    #[test]
    fn test_summary_line() {
        let stats = parse_sdiag(SDIAG_OUTPUT);
        assert_eq!(
            stats.summary_line(),
            "Scheduler: 12 running / 3 pending / 140 submitted since rollover"
        );
    }
}
