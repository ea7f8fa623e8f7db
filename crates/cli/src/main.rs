use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use batchai_engine::{
    AssumeYes, AzCliRunner, CommandRunner, Confirmation, DryRunRunner, ExperimentConfig, JobDescriptorBuilder, LifecycleContext,
    LifecycleEvent, LifecycleStep, Plan, PlanOptions, PollSpec, RunControl, StepStatus, TeardownScope, drive_lifecycle, full_plan,
    load_config, monitor_plan, parse_interval, submit_plan, teardown_plan, write_descriptor,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{info, warn};

const DEFAULT_DESCRIPTOR_PATH: &str = "job.json";
const SCOPES: [&str; 5] = ["job", "cluster", "experiment", "workspace", "group"];

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    let env_file = matches.get_one::<String>("env-file").map(PathBuf::from);
    let dry_run = matches.get_flag("dry-run");

    match matches.subcommand() {
        Some(("descriptor", sub)) => run_descriptor(env_file.as_deref(), sub),
        Some(("plan", sub)) => run_plan(env_file.as_deref(), sub),
        Some(("submit", sub)) => {
            let config = load_experiment(env_file.as_deref(), sub)?;
            let descriptor_path = prepare_descriptor(&config, sub)?;
            let context = lifecycle_context(&config, descriptor_path, sub);
            execute_plan(submit_plan(&context), dry_run, false).await
        }
        Some(("monitor", sub)) => {
            let config = load_experiment(env_file.as_deref(), sub)?;
            let context = LifecycleContext::new(&config, DEFAULT_DESCRIPTOR_PATH);
            let options = plan_options(sub)?;
            execute_plan(monitor_plan(&context, &options), dry_run, false).await
        }
        Some(("teardown", sub)) => {
            let config = load_experiment(env_file.as_deref(), sub)?;
            let context = LifecycleContext::new(&config, DEFAULT_DESCRIPTOR_PATH);
            let scope = teardown_scope(sub)?.unwrap_or(TeardownScope::Job);
            execute_plan(teardown_plan(&context, scope), dry_run, sub.get_flag("yes")).await
        }
        Some(("run", sub)) => {
            let config = load_experiment(env_file.as_deref(), sub)?;
            let descriptor_path = prepare_descriptor(&config, sub)?;
            let context = lifecycle_context(&config, descriptor_path, sub);
            let options = plan_options(sub)?;
            execute_plan(full_plan(&context, &options), dry_run, sub.get_flag("yes")).await
        }
        _ => bail!("a subcommand is required"),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    let fake = Arg::new("fake")
        .long("fake")
        .action(ArgAction::SetTrue)
        .help("Train on synthetic data (overrides USE_FAKE)");
    let out = Arg::new("out")
        .long("out")
        .short('o')
        .action(ArgAction::Set)
        .default_value(DEFAULT_DESCRIPTOR_PATH)
        .help("Where to write the job descriptor");
    let upload = Arg::new("upload")
        .long("upload")
        .action(ArgAction::Append)
        .help("File to upload to the scripts share (repeatable; replaces the default list)");
    let wait = Arg::new("wait")
        .long("wait")
        .action(ArgAction::SetTrue)
        .help("Poll the job until it succeeds or fails");
    let poll_every = Arg::new("poll-every")
        .long("poll-every")
        .action(ArgAction::Set)
        .default_value("30s")
        .help("Delay between job state polls, e.g. 10s or 2m");
    let max_polls = Arg::new("max-polls")
        .long("max-polls")
        .action(ArgAction::Set)
        .value_parser(clap::value_parser!(u32))
        .help("Give up after this many polls (at most 100)");
    let no_stream = Arg::new("no-stream")
        .long("no-stream")
        .action(ArgAction::SetTrue)
        .help("Do not stream stdout.txt and stderr.txt");
    let scope = Arg::new("scope")
        .long("scope")
        .action(ArgAction::Set)
        .value_parser(SCOPES)
        .help("Teardown scope; each scope also deletes the narrower ones");
    let yes = Arg::new("yes")
        .long("yes")
        .short('y')
        .action(ArgAction::SetTrue)
        .help("Do not ask before deleting resources");

    Command::new("batchai")
        .about("Distributed PyTorch/Horovod training on Azure Batch AI")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("env-file")
                .long("env-file")
                .global(true)
                .action(ArgAction::Set)
                .help("Path to the .env settings file (defaults to $BATCHAI_ENV_FILE or the nearest .env)"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print az commands instead of running them"),
        )
        .subcommand(
            Command::new("descriptor")
                .about("Build, validate, and write the job descriptor")
                .arg(fake.clone())
                .arg(out.clone())
                .arg(
                    Arg::new("print")
                        .long("print")
                        .action(ArgAction::SetTrue)
                        .help("Also print the descriptor JSON"),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("Print the full lifecycle plan as JSON")
                .arg(fake.clone())
                .arg(out.clone())
                .arg(upload.clone())
                .arg(wait.clone())
                .arg(poll_every.clone())
                .arg(max_polls.clone())
                .arg(no_stream.clone())
                .arg(scope.clone()),
        )
        .subcommand(
            Command::new("submit")
                .about("Create the experiment, upload scripts, and submit the job")
                .arg(fake.clone())
                .arg(out.clone())
                .arg(upload.clone()),
        )
        .subcommand(
            Command::new("monitor")
                .about("Show job status, list output files, and stream logs")
                .arg(wait.clone())
                .arg(poll_every.clone())
                .arg(max_polls.clone())
                .arg(no_stream.clone()),
        )
        .subcommand(
            Command::new("teardown")
                .about("Delete the job and, depending on scope, the surrounding resources")
                .arg(scope.clone())
                .arg(yes.clone()),
        )
        .subcommand(
            Command::new("run")
                .about("Submit, monitor, and optionally tear down in one go")
                .arg(fake)
                .arg(out)
                .arg(upload)
                .arg(wait)
                .arg(poll_every)
                .arg(max_polls)
                .arg(no_stream)
                .arg(scope)
                .arg(yes),
        )
}

fn load_experiment(env_file: Option<&Path>, matches: &ArgMatches) -> Result<ExperimentConfig> {
    let config = load_config(env_file).context("could not load experiment configuration")?;
    let fake = matches.try_get_one::<bool>("fake").ok().flatten().copied().unwrap_or(false);
    Ok(if fake { config.with_fake_data(true) } else { config })
}

fn descriptor_path(matches: &ArgMatches) -> PathBuf {
    matches
        .try_get_one::<String>("out")
        .ok()
        .flatten()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DESCRIPTOR_PATH))
}

/// Build the descriptor and write it where `job.create` will read it.
fn prepare_descriptor(config: &ExperimentConfig, matches: &ArgMatches) -> Result<PathBuf> {
    let path = descriptor_path(matches);
    let descriptor = JobDescriptorBuilder::new(config).build()?;
    write_descriptor(&descriptor, &path)?;
    Ok(path)
}

fn lifecycle_context<'a>(config: &'a ExperimentConfig, descriptor_path: PathBuf, matches: &ArgMatches) -> LifecycleContext<'a> {
    let context = LifecycleContext::new(config, descriptor_path);
    match matches.try_get_many::<String>("upload").ok().flatten() {
        Some(uploads) => context.with_uploads(uploads.map(PathBuf::from).collect()),
        None => context,
    }
}

fn run_descriptor(env_file: Option<&Path>, matches: &ArgMatches) -> Result<()> {
    let config = load_experiment(env_file, matches)?;
    let path = descriptor_path(matches);
    let descriptor = JobDescriptorBuilder::new(&config).build()?;
    write_descriptor(&descriptor, &path)?;
    if matches.get_flag("print") {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
    }
    info!(
        job = %config.job_name(),
        processes = config.total_processes(),
        path = %path.display(),
        "job descriptor ready"
    );
    Ok(())
}

fn run_plan(env_file: Option<&Path>, matches: &ArgMatches) -> Result<()> {
    let config = load_experiment(env_file, matches)?;
    let context = lifecycle_context(&config, descriptor_path(matches), matches);
    let options = plan_options(matches)?;
    let plan = full_plan(&context, &options);
    plan.validate_phase_order()?;
    let out = serde_json::json!({
        "experiment": config.experiment_name(),
        "job": config.job_name(),
        "steps": plan.summaries(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn plan_options(matches: &ArgMatches) -> Result<PlanOptions> {
    let wait = if matches.get_flag("wait") {
        let raw_interval = matches.get_one::<String>("poll-every").map(String::as_str).unwrap_or("30s");
        let interval = parse_interval(raw_interval).ok_or_else(|| anyhow!("invalid --poll-every value '{raw_interval}'"))?;
        let defaults = PollSpec::default();
        let max_attempts = matches.get_one::<u32>("max-polls").copied().unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            bail!("--max-polls must be at least 1");
        }
        Some(PollSpec::new(interval, max_attempts))
    } else {
        None
    };

    Ok(PlanOptions {
        wait,
        stream_output: !matches.get_flag("no-stream"),
        teardown: teardown_scope(matches)?,
    })
}

fn teardown_scope(matches: &ArgMatches) -> Result<Option<TeardownScope>> {
    match matches.try_get_one::<String>("scope").ok().flatten() {
        Some(raw) => Ok(Some(raw.parse::<TeardownScope>().map_err(|error| anyhow!(error))?)),
        None => Ok(None),
    }
}

async fn execute_plan(plan: Plan, dry_run: bool, assume_yes: bool) -> Result<()> {
    let runner: Arc<dyn CommandRunner + Send + Sync> = if dry_run {
        Arc::new(DryRunRunner::new())
    } else {
        Arc::new(AzCliRunner::new())
    };
    let confirmation: Arc<dyn Confirmation + Send + Sync> = if assume_yes || dry_run {
        Arc::new(AssumeYes)
    } else {
        Arc::new(StdinConfirmation)
    };

    let (control_tx, control_rx) = unbounded_channel();
    let (event_tx, event_rx) = unbounded_channel();
    let interrupts = tokio::spawn(forward_interrupts(control_tx));
    let printer = tokio::spawn(print_events(event_rx));

    let outcome = tokio::spawn(drive_lifecycle(plan, runner, confirmation, control_rx, event_tx))
        .await
        .context("lifecycle task panicked")?;
    interrupts.abort();
    printer.await.context("event printer panicked")?;

    let report = outcome?;
    report.into_result()?;
    Ok(())
}

async fn forward_interrupts(control_tx: UnboundedSender<RunControl>) {
    while tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received; stopping after the current step");
        if control_tx.send(RunControl::Cancel).is_err() {
            break;
        }
    }
}

async fn print_events(mut event_rx: UnboundedReceiver<LifecycleEvent>) {
    let mut total = 0usize;
    while let Some(event) = event_rx.recv().await {
        match event {
            LifecycleEvent::RunStarted { step_count, .. } => total = step_count,
            LifecycleEvent::StepStarted { index, step_id, command, .. } => {
                eprintln!("==> [{}/{}] {step_id}: {command}", index + 1, total);
            }
            LifecycleEvent::StepAttempt { attempt, observed, .. } => {
                eprintln!("    poll #{attempt}: {}", observed.unwrap_or_else(|| "-".to_string()));
            }
            LifecycleEvent::StepFinished {
                step_id,
                status,
                output,
                logs,
                duration_ms,
                ..
            } => {
                if !output.trim().is_empty() {
                    print!("{output}");
                    if !output.ends_with('\n') {
                        println!();
                    }
                }
                match status {
                    StepStatus::Succeeded => eprintln!("<== {step_id} succeeded ({duration_ms} ms)"),
                    StepStatus::Failed => eprintln!("<== {step_id} failed: {}", logs.last().map(String::as_str).unwrap_or("")),
                    StepStatus::Skipped => eprintln!("--- {}", logs.last().map(String::as_str).unwrap_or(&step_id)),
                }
            }
            LifecycleEvent::RunStatusChanged { status, message } => {
                if let Some(message) = message {
                    eprintln!("run {status:?}: {message}");
                }
            }
            LifecycleEvent::RunCompleted { status, error, .. } => match error {
                Some(error) => eprintln!("run finished {status:?}: {error}"),
                None => eprintln!("run finished {status:?}"),
            },
        }
    }
}

/// Asks on the terminal before each destructive step.
struct StdinConfirmation;

impl Confirmation for StdinConfirmation {
    fn confirm(&self, step: &LifecycleStep) -> bool {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "About to run '{}':\n    {}\nProceed? [y/N] ", step.id(), step.invocation);
        let _ = stderr.flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}
