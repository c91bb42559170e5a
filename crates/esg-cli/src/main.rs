use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::{env, io, thread};

use anyhow::Context;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use esg_csv::{load_worklist, read_results, CsvSink, CsvWriterConfig, WorklistConfig};
use esg_http::{ProviderConfig, ProviderDriver};
use esg_scheduler::{Cancellation, Coordinator, HarvestConfig, OnError};
use serde::{Deserialize, Serialize};
use tokio::runtime;

/// ESG rating harvester
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    /// Scrape every company of the worklist
    #[command(name = "harvest")]
    Harvest(JobArgs),
    /// Scrape again the companies missing from a previous output
    #[command(name = "retry")]
    Retry(JobArgs),
    #[command(hide = true)]
    Completion,
}

/// Everything one harvest needs, usually read from a yaml file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub worklist: WorklistConfig,
    pub output: PathBuf,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub csv_writer: CsvWriterConfig,
}

#[derive(Debug, clap::Args)]
pub struct JobArgs {
    /// Path to the yaml job configuration
    #[arg(env = "ESG_JOB_CONFIG", long, short)]
    pub config: PathBuf,
    /// Override the worklist file
    #[arg(long)]
    pub worklist: Option<PathBuf>,
    /// Only scrape the first companies of the worklist
    #[arg(long)]
    pub limit: Option<usize>,
    /// Override the output file
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// Override the identities, one worker per user agent
    #[arg(long = "user-agent")]
    pub user_agents: Vec<String>,
    /// Override the number of companies after which sessions are recycled
    #[arg(long)]
    pub recycle_every: Option<NonZeroUsize>,
    /// Override the number of retry passes over missing companies
    #[arg(long)]
    pub retry_attempts: Option<usize>,
    /// Only write the output once all workers are done
    #[arg(long)]
    pub no_checkpoint: bool,
    /// Override the checkpoint error handling strategy
    #[arg(value_enum, long)]
    pub on_checkpoint_error: Option<OnError>,
    /// No SIGINT handling, workers always finish their chunk
    #[arg(long)]
    pub no_sigint: bool,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

impl TryFrom<&JobArgs> for JobConfig {
    type Error = anyhow::Error;

    fn try_from(args: &JobArgs) -> Result<Self, Self::Error> {
        let file = fs_err::File::open(&args.config)?;
        let mut conf: JobConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("Invalid job config {}", args.config.display()))?;

        if let Some(worklist) = &args.worklist {
            conf.worklist.path = worklist.clone();
        }
        if let Some(limit) = args.limit {
            conf.worklist.limit = Some(limit);
        }
        if let Some(output) = &args.output {
            conf.output = output.clone();
        }
        if !args.user_agents.is_empty() {
            conf.harvest.identities = args.user_agents.clone();
        }
        if let Some(recycle_every) = args.recycle_every {
            conf.harvest.recycle_every = Some(recycle_every);
        }
        if let Some(retry_attempts) = args.retry_attempts {
            conf.harvest.retry_attempts = retry_attempts;
        }
        if args.no_checkpoint {
            conf.harvest.checkpoint = false;
        }
        if let Some(on_checkpoint_error) = args.on_checkpoint_error {
            conf.harvest.on_checkpoint_error = on_checkpoint_error;
        }
        if args.no_sigint {
            conf.harvest.handle_sigint = false;
        }
        Ok(conf)
    }
}

fn coordinator(conf: &JobConfig) -> anyhow::Result<Coordinator<ProviderDriver, CsvSink>> {
    let driver = ProviderDriver::new(conf.provider.clone())?;
    let sink = CsvSink::new(&conf.output, conf.csv_writer.clone());
    let coordinator = Coordinator::new(conf.harvest.clone(), driver, sink);
    if conf.harvest.handle_sigint {
        cancel_on_sigint(coordinator.cancellation())?;
    }
    Ok(coordinator)
}

/// Workers stop after their current company once SIGINT is received.
fn cancel_on_sigint(cancel: Cancellation) -> anyhow::Result<()> {
    let rt = runtime::Builder::new_current_thread().enable_io().build()?;
    thread::Builder::new()
        .name("sigint".into())
        .spawn(move || {
            rt.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        log::warn!("Interrupted, waiting for workers to finish their company");
                        cancel.cancel();
                    }
                    Err(e) => log::error!("Couldn't listen for SIGINT: {e}"),
                }
            })
        })?;
    Ok(())
}

pub fn harvest(args: JobArgs) -> anyhow::Result<()> {
    let conf = JobConfig::try_from(&args)?;
    let worklist = load_worklist(&conf.worklist)?;
    let results = coordinator(&conf)?.harvest(worklist)?;
    log::info!(
        "Harvested {} companies ({} missing) into {}",
        results.len(),
        results.missing(),
        conf.output.display()
    );
    Ok(())
}

pub fn retry(args: JobArgs) -> anyhow::Result<()> {
    let conf = JobConfig::try_from(&args)?;
    let worklist = load_worklist(&conf.worklist)?;
    let previous = read_results(&conf.output, &conf.csv_writer)?;
    let missing = previous.retry_worklist(&worklist);
    if missing.is_empty() {
        log::info!("No missing companies in {}", conf.output.display());
        return Ok(());
    }
    let results = coordinator(&conf)?.run_missing(previous, missing)?;
    log::info!(
        "{} companies still missing in {}",
        results.missing(),
        conf.output.display()
    );
    Ok(())
}

fn init_logs(args: &JobArgs) {
    if !args.quiet {
        if env::var_os("RUST_LOG").is_none() {
            env::set_var("RUST_LOG", "esg_scheduler=info,esg_http=warn,esg_csv=warn,esg=info");
        }
        env_logger::init();
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Harvest(args) => {
            init_logs(&args);
            harvest(args)
        }
        SubCommand::Retry(args) => {
            init_logs(&args);
            retry(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "esg", &mut io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"
worklist:
  path: sp500.csv
output: msci.csv
provider:
  name: msci
  searchUrl: "https://example.org/search?q={query}"
  fields:
    - name: rating
      locator:
        byClass: rating
harvest:
  retryAttempts: 2
"#;

    fn job_args(dir: &tempfile::TempDir, extra: &[&str]) -> JobArgs {
        let config = dir.path().join("job.yaml");
        fs_err::write(&config, JOB).unwrap();
        let config = config.to_str().unwrap().to_string();
        let argv = ["esg", "harvest", "--config", &config]
            .into_iter()
            .chain(extra.iter().copied());
        match Args::parse_from(argv).cmd {
            SubCommand::Harvest(args) => args,
            cmd => panic!("unexpected {cmd:?}"),
        }
    }

    #[test]
    fn job_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let conf = JobConfig::try_from(&job_args(&dir, &[])).unwrap();

        assert_eq!(PathBuf::from("sp500.csv"), conf.worklist.path);
        assert_eq!("Symbol", conf.worklist.key_column);
        assert_eq!(PathBuf::from("msci.csv"), conf.output);
        assert_eq!(2, conf.harvest.retry_attempts);
        assert_eq!(2, conf.harvest.identities.len());
        assert!(conf.harvest.checkpoint);
        assert_eq!(',', conf.csv_writer.delimiter);
    }

    #[test]
    fn args_override_job_config() {
        let dir = tempfile::tempdir().unwrap();
        let args = job_args(
            &dir,
            &[
                "--output",
                "out.csv",
                "--limit",
                "10",
                "--user-agent",
                "ua-1",
                "--user-agent",
                "ua-2",
                "--user-agent",
                "ua-3",
                "--recycle-every",
                "2",
                "--no-checkpoint",
                "--on-checkpoint-error",
                "fail",
                "--no-sigint",
            ],
        );
        let conf = JobConfig::try_from(&args).unwrap();

        assert_eq!(PathBuf::from("out.csv"), conf.output);
        assert_eq!(Some(10), conf.worklist.limit);
        assert_eq!(vec!["ua-1", "ua-2", "ua-3"], conf.harvest.identities);
        assert_eq!(NonZeroUsize::new(2), conf.harvest.recycle_every);
        assert_eq!(2, conf.harvest.retry_attempts);
        assert!(!conf.harvest.checkpoint);
        assert_eq!(OnError::Fail, conf.harvest.on_checkpoint_error);
        assert!(!conf.harvest.handle_sigint);
    }

    #[test]
    fn missing_job_config() {
        let args = JobArgs {
            config: PathBuf::from("/nonexistent/job.yaml"),
            worklist: None,
            limit: None,
            output: None,
            user_agents: vec![],
            recycle_every: None,
            retry_attempts: None,
            no_checkpoint: false,
            on_checkpoint_error: None,
            no_sigint: false,
            quiet: true,
        };

        assert!(JobConfig::try_from(&args).is_err());
    }

    #[test]
    fn cli_is_consistent() {
        Args::command().debug_assert();
    }
}
