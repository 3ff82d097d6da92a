//! Single loop execution integration tests
//!
//! Drives a real `.wiggum` workspace end to end with a scripted `sh` process
//! standing in for the agent CLI.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiggum::agent::{AgentCommand, ProcessLauncher};
use wiggum::backpressure::BackpressureRunner;
use wiggum::domain::{LoopEndReason, LoopRunnerEvent, LoopStatus, SessionStatus, TaskStatus};
use wiggum::runner::{EventSink, LoopRunner, LoopSummary};
use wiggum::workspace::{PlanFileDetector, Workspace};

const PLAN: &str = r#"---
spec: ../SPEC.md
---

- [ ] <!-- id:task-001 priority:1 deps: -->
  **Scaffold the app**

- [ ] <!-- id:task-002 priority:2 deps:task-001 -->
  **Add authentication**
"#;

/// Iteration 1 announces task-001, iteration 2 ticks task-002 in PLAN.md.
const FAKE_AGENT: &str = r#"
n=$(cat .agent-count 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > .agent-count
cat > "prompt-$n.txt"
printf '{"type":"system","subtype":"init","session_id":"fake-%s","model":"fake-model","tools":["Edit"],"permissionMode":"default"}\n' "$n"
echo 'this is not json'
if [ "$n" = 1 ]; then
  printf '{"type":"assistant","session_id":"fake-1","message":{"content":[{"type":"text","text":"Scaffolded. TASK_COMPLETE: task-001"}],"stop_reason":"end_turn","usage":{"input_tokens":10,"output_tokens":5}}}\n'
else
  sed 's/- \[ \] <!-- id:task-002/- [x] <!-- id:task-002/' .wiggum/PLAN.md > .wiggum/PLAN.tmp && mv .wiggum/PLAN.tmp .wiggum/PLAN.md
  printf '{"type":"assistant","session_id":"fake-2","message":{"content":[{"type":"text","text":"Auth is in."}],"stop_reason":"end_turn","usage":{"input_tokens":10,"output_tokens":5}}}\n'
fi
printf '{"type":"result","subtype":"success","session_id":"fake-%s","duration_ms":1200,"num_turns":3,"total_cost_usd":0.5,"result":"ok","usage":{"input_tokens":100,"output_tokens":40}}\n' "$n"
"#;

fn write_workspace(config: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(".wiggum");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.yaml"), config).unwrap();
    fs::write(dir.join("PLAN.md"), PLAN).unwrap();
    fs::write(
        dir.join("PROMPT.md"),
        "# Iteration {{iteration}}\n\n## Spec\n{{spec}}\n\n## Plan\n{{plan}}\n\n{{backpressure}}\n",
    )
    .unwrap();
    fs::write(temp.path().join("SPEC.md"), "Build a Todo app with login.\n").unwrap();
    temp
}

fn sh_agent(script: &str) -> ProcessLauncher {
    ProcessLauncher::new(AgentCommand::new("sh").args(["-c", script, "fake-agent"]))
}

async fn run_workspace(
    root: &Path,
    launcher: ProcessLauncher,
    cancel: &CancellationToken,
) -> (LoopSummary, Vec<LoopRunnerEvent>, Workspace, LoopStatus) {
    let workspace = Workspace::new(root);
    let mut lp = workspace.load().unwrap();
    let runner = LoopRunner::new(
        Arc::new(launcher),
        Arc::new(BackpressureRunner::default()),
        workspace.session_log(),
    )
    .with_detector(Box::new(PlanFileDetector::new(workspace.plan_path())));

    let (sink, mut rx) = EventSink::channel();
    let summary = tokio::time::timeout(Duration::from_secs(30), runner.run(&mut lp, &sink, cancel))
        .await
        .expect("loop finished in time");

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(lp.plan.tasks.len(), 2);
    if summary.reason == LoopEndReason::Completed {
        assert!(lp.plan.tasks.iter().all(|t| t.status == TaskStatus::Completed));
    }
    (summary, events, workspace, lp.status)
}

#[tokio::test]
async fn test_loop_runs_workspace_to_completion() {
    let temp = write_workspace(
        "name: todo\nloop:\n  mode: yolo\nbackpressure:\n  checks:\n    - {name: agent-ran, command: \"test -f .agent-count\", trigger: each_iteration}\n",
    );
    let (summary, events, workspace, status) =
        run_workspace(temp.path(), sh_agent(FAKE_AGENT), &CancellationToken::new()).await;

    assert_eq!(summary.reason, LoopEndReason::Completed);
    assert_eq!(status, LoopStatus::Completed);
    assert_eq!(summary.iterations(), 2);
    assert_eq!(summary.cumulative_cost_usd(), 1.0);
    assert_eq!(summary.total_turns(), 6);
    assert!(summary.sessions.iter().all(|s| s.status == SessionStatus::Completed));
    assert_eq!(summary.sessions[1].agent_session_id.as_deref(), Some("fake-2"));
    assert_eq!(summary.sessions[0].duration_ms, Some(1200));

    let passes = events.iter().filter(|e| e.kind() == "backpressure_pass").count();
    assert_eq!(passes, 2);
    let detected: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            LoopRunnerEvent::TaskDetected { task, .. } => Some(task.id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(detected, vec!["task-001", "task-002"]);
    assert!(events.last().unwrap().is_loop_end());

    // one transcript per session: init, malformed line, assistant, result
    let log = workspace.session_log();
    assert_eq!(log.sessions().unwrap().len(), 2);
    for session in &summary.sessions {
        let kinds: Vec<&str> = log.read(&session.id).unwrap().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["system_init", "error", "assistant_text", "result"]);
        assert!(session.log_path.exists());
    }

    let first_prompt = fs::read_to_string(temp.path().join("prompt-1.txt")).unwrap();
    assert!(first_prompt.starts_with("# Iteration 1"));
    assert!(first_prompt.contains("Build a Todo app with login."));
    assert!(first_prompt.contains("- [ ] task-001"));
    let second_prompt = fs::read_to_string(temp.path().join("prompt-2.txt")).unwrap();
    assert!(second_prompt.contains("- [x] task-001"));
}

#[tokio::test]
async fn test_failed_check_output_reaches_next_prompt() {
    let temp = write_workspace(
        "name: todo\nloop:\n  mode: bounded\n  maxIterations: 2\nbackpressure:\n  checks:\n    - {name: TypeScript, command: \"echo 'src/app.ts(3,7): error TS2322'; exit 2\", trigger: each_iteration}\n",
    );
    let agent = "n=$(cat .n 2>/dev/null || echo 0); n=$((n + 1)); echo $n > .n; cat > \"prompt-$n.txt\"; \
        printf '{\"type\":\"result\",\"subtype\":\"success\",\"session_id\":\"s\",\"duration_ms\":1,\"num_turns\":1,\"total_cost_usd\":0.1}\\n'";
    let (summary, _, _, status) = run_workspace(temp.path(), sh_agent(agent), &CancellationToken::new()).await;

    assert_eq!(summary.reason, LoopEndReason::MaxIterations);
    assert_eq!(status, LoopStatus::Paused);
    let second_prompt = fs::read_to_string(temp.path().join("prompt-2.txt")).unwrap();
    assert!(second_prompt.contains("### TypeScript failed (exit code 2)"));
    assert!(second_prompt.contains("error TS2322"));
}

#[tokio::test]
async fn test_agent_crash_ends_loop_with_error() {
    let temp = write_workspace("name: todo\n");
    let agent = "cat > /dev/null; echo 'fatal: model overloaded' >&2; exit 3";
    let (summary, events, workspace, status) =
        run_workspace(temp.path(), sh_agent(agent), &CancellationToken::new()).await;

    assert_eq!(summary.reason, LoopEndReason::Error);
    assert_eq!(status, LoopStatus::Failed);
    let error = summary.error.unwrap();
    assert!(error.contains("status 3"));
    assert!(error.contains("model overloaded"));
    assert_eq!(summary.sessions[0].status, SessionStatus::Failed);

    let entries = workspace.session_log().read(&summary.sessions[0].id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind(), "error");
    assert_eq!(events.iter().filter(|e| e.is_loop_end()).count(), 1);
}

#[tokio::test]
async fn test_missing_agent_binary_ends_loop_with_error() {
    let temp = write_workspace("name: todo\n");
    let launcher = ProcessLauncher::new(AgentCommand::new("/nonexistent/wiggum-agent"));
    let (summary, _, _, _) = run_workspace(temp.path(), launcher, &CancellationToken::new()).await;

    assert_eq!(summary.reason, LoopEndReason::Error);
    assert!(summary.error.unwrap().contains("failed to start agent"));
}

#[tokio::test]
async fn test_cancel_kills_running_agent() {
    let temp = write_workspace("name: todo\nbackpressure:\n  checks:\n    - {name: never, command: \"true\", trigger: each_iteration}\n");
    let agent = "cat > /dev/null; \
        printf '{\"type\":\"system\",\"subtype\":\"init\",\"session_id\":\"slow\",\"model\":\"m\",\"tools\":[],\"permissionMode\":\"default\"}\\n'; \
        sleep 30";
    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trip.cancel();
    });

    let started = std::time::Instant::now();
    let (summary, events, _, status) = run_workspace(temp.path(), sh_agent(agent), &cancel).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(summary.reason, LoopEndReason::UserStopped);
    assert_eq!(status, LoopStatus::Paused);
    assert_eq!(summary.sessions.len(), 1);
    assert_eq!(summary.sessions[0].status, SessionStatus::Interrupted);
    assert_eq!(summary.sessions[0].agent_session_id.as_deref(), Some("slow"));
    assert!(!events.iter().any(|e| e.kind() == "backpressure_start"));
}
