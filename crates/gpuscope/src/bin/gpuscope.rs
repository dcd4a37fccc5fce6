use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};

use gpuscope::cluster::classify::classify_nodes;
use gpuscope::cluster::lowprio::estimate_low_priority;
use gpuscope::cluster::snapshot::ClusterSnapshots;
use gpuscope::cluster::users::users_per_node;
use gpuscope::common::config::Config;
use gpuscope::common::setup::setup_logging;
use gpuscope::report::blocks::ReportBlock;
use gpuscope::report::jobs::{JobFilter, build_job_listing};
use gpuscope::report::leaderboard::build_leaderboard;
use gpuscope::report::summary::{SummaryOptions, build_cluster_summary};
use gpuscope::slurm::client::SlurmClient;
use gpuscope::{GPUSCOPE_VERSION, JobState};

#[derive(Parser)]
#[command(
    name = "gpuscope",
    version = GPUSCOPE_VERSION,
    about = "GPU cluster state reports for chat surfaces"
)]
struct RootOptions {
    #[clap(flatten)]
    common: CommonOpts,

    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser)]
struct CommonOpts {
    /// Log debug messages
    #[arg(long, global = true)]
    debug: bool,

    /// Path to the configuration file
    #[arg(long, global = true, env = "GPUSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Drop cached snapshots before building the report
    #[arg(long, global = true)]
    fresh: bool,

    /// Override the snapshot refresh interval, e.g. "5s" or "1m"
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    refresh_interval: Option<std::time::Duration>,

    #[arg(long, global = true, value_enum, default_value = "cli")]
    output_mode: OutputMode,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputMode {
    Cli,
    Json,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Per-accelerator-type overview of node capacity and low-priority claims
    Cluster(ClusterOpts),
    /// Ranked per-user GPU usage leaderboards
    Users(UsersOpts),
    /// Job listing for one lifecycle state
    Jobs(JobsOpts),
    /// Generate a shell completion script
    GenerateCompletion(GenerateCompletionOpts),
}

#[derive(Parser)]
struct ClusterOpts {
    /// Hide nodes without a free GPU
    #[arg(long)]
    hide_full: bool,
}

#[derive(Parser)]
struct UsersOpts {
    /// Only build the leaderboard with this title
    #[arg(long)]
    report: Option<String>,
}

#[derive(Parser)]
struct JobsOpts {
    #[arg(long, value_enum, default_value = "running")]
    state: JobStateArg,

    /// Only show jobs of this user
    #[arg(long)]
    user: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum JobStateArg {
    Running,
    Pending,
}

impl From<JobStateArg> for JobState {
    fn from(state: JobStateArg) -> JobState {
        match state {
            JobStateArg::Running => JobState::Running,
            JobStateArg::Pending => JobState::Pending,
        }
    }
}

#[derive(Parser)]
struct GenerateCompletionOpts {
    /// Shell flavour for which the completion script is generated
    #[arg(value_enum)]
    shell: Shell,
}

async fn command_cluster(
    snapshots: &ClusterSnapshots,
    config: &Config,
    opts: ClusterOpts,
) -> anyhow::Result<Vec<ReportBlock>> {
    let nodes = snapshots.nodes().await;
    let jobs = snapshots.jobs().await;
    let users = snapshots.users().await;
    let statistics = snapshots.statistics().await;

    let classified = classify_nodes(&nodes);
    let lowpri = estimate_low_priority(jobs.values(), &config.lowpri_partition);
    let node_users = users_per_node(&jobs, &users);

    let mut blocks = vec![
        ReportBlock::Label(format!(
            "GPU availability summary ({})",
            Local::now().format("%m/%d/%Y, %H:%M:%S")
        )),
        ReportBlock::Label(statistics.summary_line()),
    ];
    blocks.extend(build_cluster_summary(
        &classified,
        &lowpri,
        &node_users,
        config,
        &SummaryOptions {
            hide_full: opts.hide_full,
        },
    ));
    Ok(blocks)
}

async fn command_users(
    snapshots: &ClusterSnapshots,
    config: &Config,
    opts: UsersOpts,
) -> anyhow::Result<Vec<ReportBlock>> {
    let nodes = snapshots.nodes().await;
    let jobs = snapshots.jobs().await;
    let users = snapshots.users().await;
    let classified = classify_nodes(&nodes);

    let specs: Vec<_> = config
        .leaderboards
        .iter()
        .filter(|spec| {
            opts.report
                .as_ref()
                .map(|title| title == &spec.title)
                .unwrap_or(true)
        })
        .collect();
    if specs.is_empty() {
        anyhow::bail!(
            "Unknown report '{}', available: {}",
            opts.report.unwrap_or_default(),
            config
                .leaderboards
                .iter()
                .map(|spec| spec.title.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let mut blocks = Vec::new();
    for spec in specs {
        blocks.extend(build_leaderboard(spec, &jobs, &users, &classified, config));
    }
    Ok(blocks)
}

async fn command_jobs(
    snapshots: &ClusterSnapshots,
    config: &Config,
    opts: JobsOpts,
) -> anyhow::Result<Vec<ReportBlock>> {
    let nodes = snapshots.nodes().await;
    let jobs = snapshots.jobs().await;
    let users = snapshots.users().await;
    let classified = classify_nodes(&nodes);

    let filter = JobFilter {
        state: opts.state.into(),
        user: opts.user,
    };
    Ok(build_job_listing(&jobs, &users, &classified, config, &filter))
}

fn print_blocks(blocks: &[ReportBlock], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Cli => {
            for block in blocks {
                println!("{}", block.text());
            }
        }
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(blocks)?);
        }
    }
    Ok(())
}

fn generate_completion(opts: GenerateCompletionOpts) -> anyhow::Result<()> {
    let mut app = RootOptions::command();
    eprintln!("Generating completion file for {}...", opts.shell);
    generate(opts.shell, &mut app, "gpuscope".to_string(), &mut io::stdout());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> gpuscope::Result<()> {
    let opts = RootOptions::parse();

    setup_logging(opts.common.debug);

    let mut config = Config::load(opts.common.config.as_deref())?;
    if let Some(interval) = opts.common.refresh_interval {
        config.refresh_interval = interval.as_secs();
    }

    let result = match opts.subcmd {
        SubCommand::GenerateCompletion(completion_opts) => generate_completion(completion_opts),
        subcmd => {
            let snapshots = ClusterSnapshots::new(Arc::new(SlurmClient::new()), &config);
            if opts.common.fresh {
                snapshots.invalidate_all().await;
            }
            let blocks = match subcmd {
                SubCommand::Cluster(cluster_opts) => {
                    command_cluster(&snapshots, &config, cluster_opts).await
                }
                SubCommand::Users(users_opts) => {
                    command_users(&snapshots, &config, users_opts).await
                }
                SubCommand::Jobs(jobs_opts) => command_jobs(&snapshots, &config, jobs_opts).await,
                SubCommand::GenerateCompletion(_) => unreachable!(),
            };
            blocks.and_then(|blocks| print_blocks(&blocks, opts.common.output_mode))
        }
    };

    if let Err(error) = result {
        log::error!("{error:?}");
        std::process::exit(1);
    }

    Ok(())
}
