use std::future::Future;
use std::pin::Pin;
use std::process::Output;

use anyhow::Context;
use bstr::ByteSlice;
use tokio::process::Command;

use crate::cluster::users::UserTable;
use crate::slurm::records::{RawJob, RawNode, decode_jobs, decode_nodes};
use crate::slurm::stats::{SdiagStats, parse_sdiag};
use crate::{JobId, Map};

pub type FetchFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>>>>;

/// The scheduler-facing seam of the engine. The snapshot cache only ever
/// talks to this trait, so reports can be driven by a stub in tests.
pub trait ClusterBackend {
    fn fetch_nodes(&self) -> FetchFuture<Map<String, RawNode>>;
    fn fetch_jobs(&self) -> FetchFuture<Map<JobId, RawJob>>;
    fn fetch_statistics(&self) -> FetchFuture<SdiagStats>;
    fn fetch_users(&self) -> FetchFuture<UserTable>;
}

/// Queries a live Slurm cluster through its command-line tools.
#[derive(Default)]
pub struct SlurmClient;

impl SlurmClient {
    pub fn new() -> Self {
        SlurmClient
    }
}

impl ClusterBackend for SlurmClient {
    fn fetch_nodes(&self) -> FetchFuture<Map<String, RawNode>> {
        Box::pin(async {
            let output =
                run_command(vec!["scontrol", "show", "node", "--detail", "--oneliner"]).await?;
            decode_nodes(&output)
        })
    }

    fn fetch_jobs(&self) -> FetchFuture<Map<JobId, RawJob>> {
        Box::pin(async {
            let output =
                run_command(vec!["scontrol", "show", "job", "--detail", "--oneliner"]).await?;
            decode_jobs(&output)
        })
    }

    fn fetch_statistics(&self) -> FetchFuture<SdiagStats> {
        Box::pin(async {
            let output = run_command(vec!["sdiag"]).await?;
            Ok(parse_sdiag(&output))
        })
    }

    fn fetch_users(&self) -> FetchFuture<UserTable> {
        Box::pin(async {
            let output = run_command(vec!["getent", "passwd"]).await?;
            Ok(UserTable::decode(&output))
        })
    }
}

async fn run_command(arguments: Vec<&str>) -> anyhow::Result<String> {
    log::debug!("Running command `{}`", arguments.join(" "));
    let mut command = Command::new(arguments[0]);
    command.args(&arguments[1..]);

    let output = command
        .output()
        .await
        .with_context(|| format!("{} start failed", arguments[0]))?;
    let output =
        check_command_output(output).with_context(|| format!("{} execution failed", arguments[0]))?;
    let output = output
        .stdout
        .to_str()
        .map_err(|e| anyhow::anyhow!("Invalid UTF-8 in {} output: {:?}", arguments[0], e))?;
    Ok(output.to_string())
}

fn check_command_output(output: Output) -> anyhow::Result<Output> {
    let status = output.status;
    if !status.success() {
        return Err(anyhow::anyhow!(
            "Exit code: {}\nStderr: {}\nStdout: {}",
            status.code().unwrap_or(-1),
            output.stderr.to_str_lossy().trim(),
            output.stdout.to_str_lossy().trim()
        ));
    }
    Ok(output)
}
