//! Ordered lifecycle plans.
//!
//! A plan is the list of `az` steps a command will run, each tagged with the
//! lifecycle phase it belongs to. Builders here only assemble plans; nothing
//! is executed until the plan reaches [`crate::lifecycle::drive_lifecycle`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use batchai_types::LifecyclePhase;
use serde::Serialize;

use crate::commands::{self, AzInvocation, OutputMode};
use crate::config::ExperimentConfig;
use crate::error::LifecycleError;

/// Files the tutorial uploads to the share, relative to the tutorial root.
pub const DEFAULT_UPLOADS: [&str; 4] = [
    "src/imagenet_pytorch_horovod.py",
    "../common/timer.py",
    "cluster_config/docker.service",
    "cluster_config/nodeprep.sh",
];

/// Default delay between job state polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Upper bound on job state polls.
pub const MAX_POLL_ATTEMPTS: u32 = 100;

/// Which job output file to stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout.txt",
            Self::Stderr => "stderr.txt",
        }
    }

    fn id_suffix(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// The named external operations a plan can contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    ExperimentCreate,
    StorageUpload { file_name: String },
    ClusterList,
    JobCreate,
    JobList,
    JobWait,
    JobFiles,
    JobStream(OutputStream),
    JobDelete,
    DefaultsReset { name: String },
    ClusterDelete,
    ExperimentDelete,
    WorkspaceDelete,
    GroupDelete,
}

impl StepKind {
    pub fn id(&self) -> String {
        match self {
            Self::ExperimentCreate => "experiment.create".into(),
            Self::StorageUpload { file_name } => format!("storage.upload.{file_name}"),
            Self::ClusterList => "cluster.list".into(),
            Self::JobCreate => "job.create".into(),
            Self::JobList => "job.list".into(),
            Self::JobWait => "job.wait".into(),
            Self::JobFiles => "job.files".into(),
            Self::JobStream(stream) => format!("job.stream.{}", stream.id_suffix()),
            Self::JobDelete => "job.delete".into(),
            Self::DefaultsReset { name } => format!("defaults.reset.{name}"),
            Self::ClusterDelete => "cluster.delete".into(),
            Self::ExperimentDelete => "experiment.delete".into(),
            Self::WorkspaceDelete => "workspace.delete".into(),
            Self::GroupDelete => "group.delete".into(),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        match self {
            Self::ExperimentCreate => LifecyclePhase::Setup,
            Self::StorageUpload { .. } => LifecyclePhase::Upload,
            Self::ClusterList | Self::JobCreate => LifecyclePhase::Submit,
            Self::JobList | Self::JobWait | Self::JobFiles | Self::JobStream(_) => LifecyclePhase::Monitor,
            Self::JobDelete
            | Self::DefaultsReset { .. }
            | Self::ClusterDelete
            | Self::ExperimentDelete
            | Self::WorkspaceDelete
            | Self::GroupDelete => LifecyclePhase::Teardown,
        }
    }

    /// Deletes need operator confirmation before they run.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::JobDelete | Self::ClusterDelete | Self::ExperimentDelete | Self::WorkspaceDelete | Self::GroupDelete
        )
    }
}

/// Polling bounds for a repeating step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollSpec {
    /// Clamps `max_attempts` into `1..=MAX_POLL_ATTEMPTS`.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.clamp(1, MAX_POLL_ATTEMPTS),
        }
    }
}

impl Default for PollSpec {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, MAX_POLL_ATTEMPTS)
    }
}

/// One planned step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleStep {
    pub kind: StepKind,
    pub invocation: AzInvocation,
    pub poll: Option<PollSpec>,
}

impl LifecycleStep {
    pub fn new(kind: StepKind, invocation: AzInvocation) -> Self {
        Self {
            kind,
            invocation,
            poll: None,
        }
    }

    pub fn polling(mut self, poll: PollSpec) -> Self {
        self.poll = Some(poll);
        self
    }

    pub fn id(&self) -> String {
        self.kind.id()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.kind.phase()
    }

    pub fn is_destructive(&self) -> bool {
        self.kind.is_destructive()
    }
}

/// Serializable view of a step, used by `batchai plan`.
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub id: String,
    pub phase: LifecyclePhase,
    pub destructive: bool,
    pub command: String,
    pub output: OutputMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

/// Ordered sequence of lifecycle steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<LifecycleStep>,
}

impl Plan {
    pub fn new(steps: Vec<LifecycleStep>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_ids(&self) -> Vec<String> {
        self.steps.iter().map(LifecycleStep::id).collect()
    }

    /// Appends `other`'s steps after this plan's.
    pub fn then(mut self, other: Plan) -> Self {
        self.steps.extend(other.steps);
        self
    }

    /// Rejects plans whose phases ever go backwards.
    pub fn validate_phase_order(&self) -> Result<(), LifecycleError> {
        let mut previous: Option<LifecyclePhase> = None;
        for step in &self.steps {
            let phase = step.phase();
            if let Some(previous) = previous
                && phase < previous
            {
                return Err(LifecycleError::phase_order(&step.id(), phase, previous));
            }
            previous = Some(phase);
        }
        Ok(())
    }

    pub fn summaries(&self) -> Vec<StepSummary> {
        self.steps
            .iter()
            .map(|step| StepSummary {
                id: step.id(),
                phase: step.phase(),
                destructive: step.is_destructive(),
                command: step.invocation.display(),
                output: step.invocation.output,
                poll_interval_secs: step.poll.map(|poll| poll.interval.as_secs()),
                max_attempts: step.poll.map(|poll| poll.max_attempts),
            })
            .collect()
    }
}

/// How much of the experiment teardown removes. Each scope includes the
/// ones below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownScope {
    Job,
    Cluster,
    Experiment,
    Workspace,
    Group,
}

impl TeardownScope {
    pub const ALL: [TeardownScope; 5] = [Self::Job, Self::Cluster, Self::Experiment, Self::Workspace, Self::Group];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Cluster => "cluster",
            Self::Experiment => "experiment",
            Self::Workspace => "workspace",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for TeardownScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeardownScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown teardown scope '{value}' (expected job, cluster, experiment, workspace, or group)"))
    }
}

/// Monitoring and teardown choices for a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    /// Poll `job.wait` until the job reaches a terminal state.
    pub wait: Option<PollSpec>,
    /// Stream stdout/stderr after listing job files.
    pub stream_output: bool,
    pub teardown: Option<TeardownScope>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            wait: None,
            stream_output: true,
            teardown: None,
        }
    }
}

/// Everything plan builders need to know about one experiment.
#[derive(Debug, Clone)]
pub struct LifecycleContext<'a> {
    pub config: &'a ExperimentConfig,
    pub descriptor_path: PathBuf,
    pub uploads: Vec<PathBuf>,
}

impl<'a> LifecycleContext<'a> {
    /// Context with the default upload list.
    pub fn new(config: &'a ExperimentConfig, descriptor_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            descriptor_path: descriptor_path.into(),
            uploads: DEFAULT_UPLOADS.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn with_uploads(mut self, uploads: Vec<PathBuf>) -> Self {
        self.uploads = uploads;
        self
    }
}

/// Experiment creation, script uploads, cluster listing, job submission.
pub fn submit_plan(context: &LifecycleContext<'_>) -> Plan {
    let config = context.config;
    let mut steps = vec![LifecycleStep::new(StepKind::ExperimentCreate, commands::experiment_create(config))];
    steps.extend(context.uploads.iter().map(|source| {
        LifecycleStep::new(
            StepKind::StorageUpload {
                file_name: upload_file_name(source),
            },
            commands::storage_upload(config, source),
        )
    }));
    steps.push(LifecycleStep::new(StepKind::ClusterList, commands::cluster_list(config)));
    steps.push(LifecycleStep::new(
        StepKind::JobCreate,
        commands::job_create(config, &context.descriptor_path),
    ));
    Plan::new(steps)
}

/// Job status, optional wait, output file listing and streaming.
pub fn monitor_plan(context: &LifecycleContext<'_>, options: &PlanOptions) -> Plan {
    let config = context.config;
    let mut steps = vec![LifecycleStep::new(StepKind::JobList, commands::job_list(config))];
    if let Some(poll) = options.wait {
        steps.push(LifecycleStep::new(StepKind::JobWait, commands::job_show_state(config)).polling(poll));
    }
    steps.push(LifecycleStep::new(StepKind::JobFiles, commands::job_file_list(config)));
    if options.stream_output {
        for stream in [OutputStream::Stdout, OutputStream::Stderr] {
            steps.push(LifecycleStep::new(
                StepKind::JobStream(stream),
                commands::job_file_stream(config, stream.file_name()),
            ));
        }
    }
    Plan::new(steps)
}

/// Deletes for `scope` and every narrower scope, narrowest first.
pub fn teardown_plan(context: &LifecycleContext<'_>, scope: TeardownScope) -> Plan {
    let config = context.config;
    let mut steps = vec![LifecycleStep::new(StepKind::JobDelete, commands::job_delete(config))];
    if scope >= TeardownScope::Cluster {
        for name in ["group", "location"] {
            steps.push(LifecycleStep::new(
                StepKind::DefaultsReset { name: name.to_string() },
                commands::reset_default(name),
            ));
        }
        steps.push(LifecycleStep::new(StepKind::ClusterDelete, commands::cluster_delete(config)));
    }
    if scope >= TeardownScope::Experiment {
        steps.push(LifecycleStep::new(StepKind::ExperimentDelete, commands::experiment_delete(config)));
    }
    if scope >= TeardownScope::Workspace {
        steps.push(LifecycleStep::new(StepKind::WorkspaceDelete, commands::workspace_delete(config)));
    }
    if scope >= TeardownScope::Group {
        steps.push(LifecycleStep::new(StepKind::GroupDelete, commands::group_delete(config)));
    }
    Plan::new(steps)
}

/// The whole tutorial: submit, monitor, then teardown when requested.
pub fn full_plan(context: &LifecycleContext<'_>, options: &PlanOptions) -> Plan {
    let plan = submit_plan(context).then(monitor_plan(context, options));
    match options.teardown {
        Some(scope) => plan.then(teardown_plan(context, scope)),
        None => plan,
    }
}

/// Parses `30`, `10s`, or `2m` into a duration.
pub fn parse_interval(raw_interval: &str) -> Option<Duration> {
    let trimmed = raw_interval.trim();
    if trimmed.is_empty() {
        return None;
    }
    let last_character = trimmed.chars().last()?;
    if last_character.is_ascii_alphabetic() {
        let number = &trimmed[..trimmed.len() - 1];
        let value: u64 = number.parse().ok()?;
        return match last_character {
            's' | 'S' => Some(Duration::from_secs(value)),
            'm' | 'M' => value.checked_mul(60).map(Duration::from_secs),
            _ => None,
        };
    }
    let value: u64 = trimmed.parse().ok()?;
    Some(Duration::from_secs(value))
}

fn upload_file_name(source: &Path) -> String {
    source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string())
}
