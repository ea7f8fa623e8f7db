use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batchai_engine::{
    AssumeYes, AzInvocation, CommandOutput, CommandRunner, Confirmation, DryRunRunner, ExternalCommandError, JobDescriptorBuilder,
    LifecycleContext, LifecycleError, LifecycleEvent, LifecycleStep, PlanOptions, PollSpec, RunStatus, StepStatus, TeardownScope,
    full_plan, load_config_from_path, read_descriptor, teardown_plan, write_descriptor,
};
use tokio::sync::mpsc::unbounded_channel;

const ENV_FILE: &str = "\
GROUP_NAME=batchrg
FILE_SHARE_NAME=batchshare
WORKSPACE=workspace
NUM_NODES=2
CLUSTER_NAME=gpucluster
GPU_TYPE=V100
PROCESSES_PER_NODE=4
USE_FAKE=false
DOCKER_REPOSITORY=masalvar
";

/// Fake `az`: records argument lines and replays scripted job states.
struct FakeAz {
    calls: Mutex<Vec<String>>,
    job_states: Mutex<Vec<&'static str>>,
    fail_on: Option<&'static str>,
}

impl FakeAz {
    fn new(job_states: &[&'static str], fail_on: Option<&'static str>) -> Self {
        let mut states = job_states.to_vec();
        states.reverse();
        Self {
            calls: Mutex::new(Vec::new()),
            job_states: Mutex::new(states),
            fail_on,
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl CommandRunner for FakeAz {
    fn run(&self, invocation: &AzInvocation) -> Result<CommandOutput, ExternalCommandError> {
        let line = invocation.args.join(" ");
        self.calls.lock().expect("calls lock").push(line.clone());

        if let Some(needle) = self.fail_on
            && line.contains(needle)
        {
            return Err(ExternalCommandError::NonZeroExit {
                command: invocation.display(),
                code: 2,
                stderr: "ERROR: The specified share does not exist.".into(),
            });
        }
        if line.contains("executionState") {
            let state = self.job_states.lock().expect("states lock").pop().unwrap_or("running");
            return Ok(CommandOutput::success(format!("{state}\n")));
        }
        Ok(CommandOutput::success(String::new()))
    }
}

/// Records which destructive steps were offered and approves only some.
struct SelectiveConfirmation {
    approve: &'static [&'static str],
    asked: Mutex<Vec<String>>,
}

impl Confirmation for SelectiveConfirmation {
    fn confirm(&self, step: &LifecycleStep) -> bool {
        let id = step.id();
        self.asked.lock().expect("asked lock").push(id.clone());
        self.approve.contains(&id.as_str())
    }
}

struct Workspace {
    _directory: tempfile::TempDir,
    env_path: PathBuf,
    descriptor_path: PathBuf,
}

fn workspace() -> Workspace {
    let directory = tempfile::tempdir().expect("tempdir");
    let env_path = directory.path().join(".env");
    fs::write(&env_path, ENV_FILE).expect("write env");
    let descriptor_path = directory.path().join("out").join("job.json");
    Workspace {
        env_path,
        descriptor_path,
        _directory: directory,
    }
}

async fn run(
    plan: batchai_engine::Plan,
    runner: Arc<dyn CommandRunner + Send + Sync>,
    confirmation: Arc<dyn Confirmation + Send + Sync>,
) -> (batchai_engine::LifecycleReport, Vec<LifecycleEvent>) {
    let (_control_tx, control_rx) = unbounded_channel();
    let (event_tx, mut event_rx) = unbounded_channel();
    let report = batchai_engine::drive_lifecycle(plan, runner, confirmation, control_rx, event_tx)
        .await
        .expect("plan is phase ordered");
    let mut events = Vec::new();
    while let Ok(event) = event_rx.try_recv() {
        events.push(event);
    }
    (report, events)
}

#[tokio::test]
async fn full_tutorial_run_submits_the_written_descriptor() {
    let workspace = workspace();
    let config = load_config_from_path(&workspace.env_path).expect("config");
    let descriptor = JobDescriptorBuilder::new(&config).build().expect("descriptor");
    write_descriptor(&descriptor, &workspace.descriptor_path).expect("write descriptor");
    assert_eq!(read_descriptor(&workspace.descriptor_path).expect("read back"), descriptor);

    let context = LifecycleContext::new(&config, &workspace.descriptor_path);
    let options = PlanOptions {
        wait: Some(PollSpec::new(Duration::ZERO, 10)),
        stream_output: true,
        teardown: Some(TeardownScope::Cluster),
    };
    let fake = Arc::new(FakeAz::new(&["queued", "running", "succeeded"], None));
    let (report, events) = run(full_plan(&context, &options), fake.clone(), Arc::new(AssumeYes)).await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.step("job.wait").map(|step| step.attempts), Some(3));

    let calls = fake.calls();
    let expected_create = format!(
        "batchai job create -n pytorch-horovod-8 --cluster gpucluster -w workspace -e distributed_pytorch_V100 -f {}",
        workspace.descriptor_path.display()
    );
    assert!(calls.contains(&expected_create), "{calls:#?}");
    assert_eq!(calls.last().map(String::as_str), Some("batchai cluster delete -w workspace --name gpucluster -g batchrg -y"));

    let attempts = events
        .iter()
        .filter(|event| matches!(event, LifecycleEvent::StepAttempt { .. }))
        .count();
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn upload_failure_stops_before_submission() {
    let workspace = workspace();
    let config = load_config_from_path(&workspace.env_path).expect("config");
    let context = LifecycleContext::new(&config, &workspace.descriptor_path);
    let fake = Arc::new(FakeAz::new(&[], Some("timer.py")));

    let (report, _) = run(full_plan(&context, &PlanOptions::default()), fake.clone(), Arc::new(AssumeYes)).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(!fake.calls().iter().any(|call| call.contains("job create")));
    assert_eq!(
        report.step("storage.upload.timer.py").and_then(|step| step.error.clone()).as_deref(),
        Some("ERROR: The specified share does not exist.")
    );
    let after_failure = report
        .steps
        .iter()
        .skip_while(|step| step.id != "storage.upload.timer.py")
        .skip(1);
    assert!(after_failure.into_iter().all(|step| step.status == StepStatus::Skipped));
}

#[tokio::test]
async fn declining_a_wider_delete_keeps_narrower_ones() {
    let workspace = workspace();
    let config = load_config_from_path(&workspace.env_path).expect("config");
    let context = LifecycleContext::new(&config, &workspace.descriptor_path);
    let fake = Arc::new(FakeAz::new(&[], None));
    let confirmation = Arc::new(SelectiveConfirmation {
        approve: &["job.delete", "cluster.delete"],
        asked: Mutex::new(Vec::new()),
    });

    let (report, _) = run(teardown_plan(&context, TeardownScope::Group), fake.clone(), confirmation.clone()).await;

    assert_eq!(report.status, RunStatus::Declined);
    assert_eq!(
        confirmation.asked.lock().expect("asked lock").clone(),
        vec!["job.delete", "cluster.delete", "experiment.delete"]
    );
    let calls = fake.calls();
    assert!(calls.iter().any(|call| call.starts_with("batchai cluster delete")));
    assert!(!calls.iter().any(|call| call.starts_with("batchai experiment delete")));
    assert!(!calls.iter().any(|call| call.starts_with("group delete")));
    assert!(matches!(
        report.into_result(),
        Err(LifecycleError::Declined { step_id }) if step_id == "experiment.delete"
    ));
}

#[tokio::test]
async fn dry_run_walks_the_whole_plan_without_side_effects() {
    let workspace = workspace();
    let config = load_config_from_path(&workspace.env_path).expect("config");
    let context = LifecycleContext::new(&config, &workspace.descriptor_path);
    let options = PlanOptions {
        wait: Some(PollSpec::new(Duration::ZERO, 5)),
        stream_output: false,
        teardown: Some(TeardownScope::Workspace),
    };
    let plan = full_plan(&context, &options);
    let step_count = plan.len();
    let runner = Arc::new(DryRunRunner::new());

    let (report, _) = run(plan, runner.clone(), Arc::new(AssumeYes)).await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(runner.recorded().len(), step_count);
    assert!(runner.recorded()[0].starts_with("az batchai experiment create"));
    assert!(!workspace.descriptor_path.exists());
}
