//! On-disk `.wiggum/` workspace.
//!
//! ```text
//! .wiggum/
//! ├── config.yaml       loop settings
//! ├── PLAN.md           tasks, frontmatter points at the spec
//! ├── PROMPT.md         prompt template
//! ├── BACKPRESSURE.md   optional agent-facing context
//! └── sessions/<session-id>/transcript.jsonl
//! ```
//!
//! The loop runner never touches these files directly; the workspace turns
//! them into a `Loop` and a `SessionLog`.

mod config_file;
mod plan_file;

pub use config_file::{BackpressureSettings, LoopSettings, WorkspaceConfig};
pub use plan_file::{PlanFile, parse_plan};

use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent::StreamMessage;
use crate::domain::{Loop, Plan, TaskStatus};
use crate::error::{Result, WiggumError};
use crate::runner::{TaskDetection, TaskDetector, TranscriptTaskDetector};
use crate::session_log::SessionLog;

pub const WIGGUM_DIR: &str = ".wiggum";

/// A project directory containing `.wiggum/`
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(WIGGUM_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir().join("config.yaml")
    }

    pub fn plan_path(&self) -> PathBuf {
        self.dir().join("PLAN.md")
    }

    pub fn prompt_path(&self) -> PathBuf {
        self.dir().join("PROMPT.md")
    }

    pub fn backpressure_path(&self) -> PathBuf {
        self.dir().join("BACKPRESSURE.md")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.dir().join("sessions")
    }

    pub fn exists(&self) -> bool {
        self.dir().is_dir()
    }

    pub fn session_log(&self) -> SessionLog {
        SessionLog::new(self.sessions_dir())
    }

    pub fn load_config(&self) -> Result<WorkspaceConfig> {
        WorkspaceConfig::load(&self.config_path())
    }

    /// Parse and validate PLAN.md
    pub fn load_plan(&self) -> Result<PlanFile> {
        let path = self.plan_path();
        let content = read(&path)?;
        let plan_file = parse_plan(&content)?;
        Plan::new(plan_file.tasks.clone()).validate()?;
        Ok(plan_file)
    }

    /// Assemble a loop from the workspace files
    pub fn load(&self) -> Result<Loop> {
        if !self.exists() {
            return Err(WiggumError::Workspace(format!(
                "no {} directory in {}",
                WIGGUM_DIR,
                self.root.display()
            )));
        }
        let target_dir = self.root.canonicalize()?;
        let config = self.load_config()?;
        let plan_file = self.load_plan()?;

        let mut plan = Plan::new(plan_file.tasks);
        plan.path = Some(self.plan_path());

        let mut loop_instance = Loop::new(&config.name, target_dir)
            .with_config(config.loop_config())
            .with_template(read(&self.prompt_path())?);
        loop_instance.prompt.path = Some(self.prompt_path());

        match plan_file.spec {
            Some(spec) => {
                let spec_path = self.dir().join(spec);
                loop_instance.spec.content = read(&spec_path)?;
                loop_instance.spec.path = Some(spec_path);
            }
            None => warn!("{} has no spec in its frontmatter", self.plan_path().display()),
        }

        loop_instance.plan = plan;
        loop_instance.backpressure.checks = config.backpressure.checks;
        let backpressure_path = self.backpressure_path();
        if backpressure_path.is_file() {
            loop_instance.backpressure.file_path = Some(backpressure_path);
        }

        info!(
            "loaded workspace '{}' with {} tasks and {} checks",
            loop_instance.name,
            loop_instance.plan.tasks.len(),
            loop_instance.backpressure.checks.len()
        );
        Ok(loop_instance)
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| WiggumError::Workspace(format!("cannot read {}: {}", path.display(), e)))
}

/// Reads progress from PLAN.md after each session, on top of the transcript.
///
/// Agents usually tick the checkbox themselves; this picks those edits up even
/// when the transcript carries no explicit signal.
pub struct PlanFileDetector {
    plan_path: PathBuf,
    transcript: TranscriptTaskDetector,
}

impl PlanFileDetector {
    pub fn new(plan_path: impl Into<PathBuf>) -> Self {
        Self {
            plan_path: plan_path.into(),
            transcript: TranscriptTaskDetector,
        }
    }
}

impl TaskDetector for PlanFileDetector {
    fn detect(&self, plan: &Plan, messages: &[StreamMessage]) -> TaskDetection {
        let mut detection = self.transcript.detect(plan, messages);

        let on_disk = match read(&self.plan_path).and_then(|content| parse_plan(&content)) {
            Ok(plan_file) => plan_file,
            Err(e) => {
                warn!("could not re-read plan: {}", e);
                return detection;
            }
        };

        for task in &on_disk.tasks {
            let Some(current) = plan.get(&task.id) else {
                continue;
            };
            match task.status {
                TaskStatus::Completed if !current.status.is_done() => {
                    debug!("plan file marks {} completed", task.id);
                    detection.complete(&task.id);
                }
                TaskStatus::InProgress if detection.worked_on.is_none() => {
                    detection.worked_on = Some(task.id.clone());
                }
                _ => {}
            }
        }

        if detection.worked_on.is_none() {
            detection.worked_on = detection.completed.first().cloned();
        }
        detection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackpressureTrigger, LoopMode};
    use tempfile::TempDir;

    const PLAN: &str = "---\nspec: ../SPEC.md\n---\n\n- [ ] <!-- id:task-001 priority:1 deps: -->\n  **Scaffold**\n\n- [ ] <!-- id:task-002 priority:2 deps:task-001 -->\n  **Auth**\n";

    fn write_workspace(plan: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(WIGGUM_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("config.yaml"),
            "name: demo\nloop:\n  mode: bounded\n  maxIterations: 5\nbackpressure:\n  checks:\n    - {name: lint, command: \"true\", trigger: each_iteration}\n",
        )
        .unwrap();
        fs::write(dir.join("PLAN.md"), plan).unwrap();
        fs::write(dir.join("PROMPT.md"), "Iteration {{iteration}}\n{{plan}}").unwrap();
        fs::write(temp.path().join("SPEC.md"), "# Todo app\n").unwrap();
        temp
    }

    #[test]
    fn test_load_workspace() {
        let temp = write_workspace(PLAN);
        let workspace = Workspace::new(temp.path());
        let lp = workspace.load().unwrap();

        assert_eq!(lp.name, "demo");
        assert_eq!(lp.target_dir, temp.path().canonicalize().unwrap());
        assert_eq!(lp.config.mode, LoopMode::Bounded);
        assert_eq!(lp.config.iteration_cap(), Some(5));
        assert_eq!(lp.spec.content, "# Todo app\n");
        assert_eq!(lp.plan.tasks.len(), 2);
        assert_eq!(lp.plan.path, Some(workspace.plan_path()));
        assert_eq!(lp.prompt.template, "Iteration {{iteration}}\n{{plan}}");
        assert_eq!(lp.backpressure.checks[0].trigger, BackpressureTrigger::EachIteration);
        assert_eq!(lp.backpressure.file_path, None);
        assert_eq!(workspace.session_log().root(), workspace.sessions_dir());
    }

    #[test]
    fn test_backpressure_file_recorded_when_present() {
        let temp = write_workspace(PLAN);
        let workspace = Workspace::new(temp.path());
        fs::write(workspace.backpressure_path(), "Run npm test before finishing.").unwrap();
        let lp = workspace.load().unwrap();
        assert_eq!(lp.backpressure.file_path, Some(workspace.backpressure_path()));
    }

    #[test]
    fn test_missing_workspace() {
        let temp = TempDir::new().unwrap();
        let err = Workspace::new(temp.path()).load().unwrap_err();
        assert!(err.to_string().contains("no .wiggum directory"));
    }

    #[test]
    fn test_missing_spec_file() {
        let temp = write_workspace(&PLAN.replace("../SPEC.md", "../MISSING.md"));
        let err = Workspace::new(temp.path()).load().unwrap_err();
        assert!(err.to_string().contains("MISSING.md"));
    }

    #[test]
    fn test_cyclic_plan_rejected() {
        let plan = "- [ ] <!-- id:a deps:b -->\n- [ ] <!-- id:b deps:a -->\n";
        let temp = write_workspace(plan);
        let err = Workspace::new(temp.path()).load().unwrap_err();
        assert!(matches!(err, WiggumError::InvalidPlan(_)));
    }

    #[test]
    fn test_plan_file_detector_sees_ticked_box() {
        let temp = write_workspace(PLAN);
        let workspace = Workspace::new(temp.path());
        let plan = Plan::new(workspace.load_plan().unwrap().tasks);

        fs::write(workspace.plan_path(), PLAN.replacen("- [ ] <!-- id:task-001", "- [x] <!-- id:task-001", 1)).unwrap();
        let detection = PlanFileDetector::new(workspace.plan_path()).detect(&plan, &[]);
        assert_eq!(detection.completed, vec!["task-001"]);
        assert_eq!(detection.worked_on.as_deref(), Some("task-001"));
    }

    #[test]
    fn test_plan_file_detector_in_progress_marker() {
        let temp = write_workspace(PLAN);
        let workspace = Workspace::new(temp.path());
        let plan = Plan::new(workspace.load_plan().unwrap().tasks);

        fs::write(workspace.plan_path(), PLAN.replacen("- [ ] <!-- id:task-002", "- [~] <!-- id:task-002", 1)).unwrap();
        let detection = PlanFileDetector::new(workspace.plan_path()).detect(&plan, &[]);
        assert!(detection.completed.is_empty());
        assert_eq!(detection.worked_on.as_deref(), Some("task-002"));
    }

    #[test]
    fn test_plan_file_detector_survives_missing_file() {
        let plan = Plan::new(vec![crate::domain::Task::new("a", "A")]);
        let detection = PlanFileDetector::new("/nonexistent/PLAN.md").detect(&plan, &[]);
        assert_eq!(detection, TaskDetection::default());
    }
}
