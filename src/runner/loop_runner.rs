//! Loop runner implementation - drives agent sessions until a stop condition.
//!
//! Each iteration:
//! 1. Builds the prompt with the previous iteration's feedback
//! 2. Spawns one agent session and streams its messages into the session log
//! 3. Finalizes the session record from the result message
//! 4. Runs `each_iteration` checks, then `each_task` checks per newly completed task
//! 5. Evaluates stop conditions
//!
//! Stop conditions are evaluated only between iterations. A running session is
//! never preempted for budget, so spend can exceed the budget by one session.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use super::detector::{TaskDetector, TranscriptTaskDetector};
use super::events::EventSink;
use crate::agent::protocol::SystemSubtype;
use crate::agent::{AgentLauncher, AgentOptions, AgentOutput, AgentStream, ProcessExit, ResultMessage, StreamMessage};
use crate::backpressure::CheckRunner;
use crate::domain::{
    BackpressureCheck, BackpressureTrigger, Loop, LoopEndReason, LoopRunnerEvent, LoopStatus, Session, SessionStatus,
};
use crate::error::Result;
use crate::prompt::{Feedback, PromptBuilder, PromptVariables};
use crate::session_log::{SessionLog, SessionLogEntry};

/// Configuration for the LoopRunner.
#[derive(Debug, Clone)]
pub struct LoopRunnerConfig {
    /// `--max-turns` passed to every session
    pub max_turns: Option<u32>,
    /// Pass `--dangerously-skip-permissions`
    pub skip_permissions: bool,
    /// Resume the previous iteration's agent session instead of starting fresh
    pub resume_previous_session: bool,
    /// Cap on check output copied into the next prompt
    pub max_output_chars: usize,
}

impl Default for LoopRunnerConfig {
    fn default() -> Self {
        Self {
            max_turns: None,
            skip_permissions: false,
            resume_previous_session: false,
            max_output_chars: 20_000,
        }
    }
}

/// What a finished run looked like
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    pub reason: LoopEndReason,
    /// Set for `LoopEndReason::Error`
    pub error: Option<String>,
    pub sessions: Vec<Session>,
}

impl LoopSummary {
    pub fn iterations(&self) -> u32 {
        iteration_count(&self.sessions)
    }

    pub fn cumulative_cost_usd(&self) -> f64 {
        total_cost(&self.sessions)
    }

    pub fn total_turns(&self) -> u32 {
        self.sessions.iter().map(|s| s.num_turns).sum()
    }
}

#[derive(Default)]
struct RunState {
    sessions: Vec<Session>,
    feedback: Feedback,
    last_agent_session: Option<String>,
}

impl RunState {
    fn cumulative_cost(&self) -> f64 {
        total_cost(&self.sessions)
    }

    fn completed_iterations(&self) -> u32 {
        iteration_count(&self.sessions)
    }
}

fn total_cost(sessions: &[Session]) -> f64 {
    sessions.iter().map(|s| s.cost_usd).sum()
}

fn iteration_count(sessions: &[Session]) -> u32 {
    sessions.len() as u32
}

#[derive(Default)]
struct StreamOutcome {
    messages: Vec<StreamMessage>,
    result: Option<ResultMessage>,
    exit: Option<ProcessExit>,
    assistant_turns: u32,
    log_failure: Option<String>,
}

/// LoopRunner owns a loop while it runs and drives it to a stop reason.
pub struct LoopRunner<A, C>
where
    A: AgentLauncher,
    C: CheckRunner,
{
    launcher: Arc<A>,
    checks: Arc<C>,
    session_log: SessionLog,
    prompt_builder: PromptBuilder,
    detector: Box<dyn TaskDetector>,
    config: LoopRunnerConfig,
}

impl<A, C> LoopRunner<A, C>
where
    A: AgentLauncher,
    C: CheckRunner,
{
    pub fn new(launcher: Arc<A>, checks: Arc<C>, session_log: SessionLog) -> Self {
        Self {
            launcher,
            checks,
            session_log,
            prompt_builder: PromptBuilder::new(),
            detector: Box::new(TranscriptTaskDetector),
            config: LoopRunnerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LoopRunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn TaskDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn session_log(&self) -> &SessionLog {
        &self.session_log
    }

    /// Run with a per-event callback; returns after the callback has seen `loop_end`.
    pub async fn start<F>(&self, loop_instance: &mut Loop, on_event: F, cancel: &CancellationToken) -> LoopSummary
    where
        F: FnMut(LoopRunnerEvent) + Send + 'static,
    {
        let (sink, forwarder) = EventSink::from_callback(on_event);
        let summary = self.run(loop_instance, &sink, cancel).await;
        drop(sink);
        if let Err(e) = forwarder.await {
            warn!("event forwarder failed: {}", e);
        }
        summary
    }

    /// Run until a stop condition. Emits exactly one `loop_end`, always last.
    pub async fn run(&self, loop_instance: &mut Loop, events: &EventSink, cancel: &CancellationToken) -> LoopSummary {
        info!(
            "starting loop {} ({}) in {}",
            loop_instance.name,
            loop_instance.id,
            loop_instance.target_dir.display()
        );
        loop_instance.set_status(LoopStatus::Running);

        let mut state = RunState::default();
        let mut fatal = None;
        let (reason, error) = loop {
            if let Some(stop) = self.stop_reason(loop_instance, &state, fatal.take(), cancel) {
                break stop;
            }
            let iteration = state.completed_iterations() + 1;
            if let Err(e) = self.run_iteration(loop_instance, iteration, &mut state, events, cancel).await {
                fatal = Some(e);
            }
        };

        loop_instance.set_status(match reason {
            LoopEndReason::Completed => LoopStatus::Completed,
            LoopEndReason::Error => LoopStatus::Failed,
            _ => LoopStatus::Paused,
        });
        info!(
            "loop {} ended: {} after {} iterations, ${:.4}",
            loop_instance.id,
            reason,
            state.sessions.len(),
            state.cumulative_cost()
        );
        events.emit(LoopRunnerEvent::LoopEnd {
            reason,
            error: error.clone(),
        });

        LoopSummary {
            reason,
            error,
            sessions: state.sessions,
        }
    }

    /// Run `pre_commit` checks. The loop never calls this itself.
    pub async fn run_pre_commit(&self, loop_instance: &Loop, events: &EventSink, cancel: &CancellationToken) -> bool {
        self.run_trigger(loop_instance, BackpressureTrigger::PreCommit, events, cancel)
            .await
    }

    /// Run every check for one trigger outside the loop. True if all passed.
    pub async fn run_trigger(
        &self,
        loop_instance: &Loop,
        trigger: BackpressureTrigger,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> bool {
        let checks = loop_instance.backpressure.for_trigger(trigger);
        self.run_checks(checks, &loop_instance.target_dir, events, cancel, None)
            .await
    }

    fn stop_reason(
        &self,
        loop_instance: &Loop,
        state: &RunState,
        fatal: Option<String>,
        cancel: &CancellationToken,
    ) -> Option<(LoopEndReason, Option<String>)> {
        if cancel.is_cancelled() {
            return Some((LoopEndReason::UserStopped, None));
        }
        if let Some(error) = fatal {
            return Some((LoopEndReason::Error, Some(error)));
        }
        if loop_instance.plan.is_complete() {
            return Some((LoopEndReason::Completed, None));
        }
        if let Some(budget) = loop_instance.config.budget_cap() {
            if state.cumulative_cost() > budget {
                return Some((LoopEndReason::BudgetExceeded, None));
            }
        }
        if let Some(max) = loop_instance.config.iteration_cap() {
            if state.completed_iterations() >= max {
                return Some((LoopEndReason::MaxIterations, None));
            }
        }
        None
    }

    /// One agent session plus its checks. `Err` ends the loop with `error`.
    async fn run_iteration(
        &self,
        loop_instance: &mut Loop,
        iteration: u32,
        state: &mut RunState,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), String> {
        let variables = PromptVariables {
            spec: loop_instance.spec.content.clone(),
            plan: loop_instance.plan.render_checklist(),
            backpressure: std::mem::take(&mut state.feedback).render(),
            iteration,
            remaining_budget_usd: loop_instance
                .config
                .budget_cap()
                .map(|budget| budget - state.cumulative_cost()),
            remaining_iterations: loop_instance
                .config
                .iteration_cap()
                .map(|max| max.saturating_sub(state.completed_iterations())),
        };
        let prompt = self
            .prompt_builder
            .build(&loop_instance.prompt.template, &variables);

        let mut session = Session::start(&loop_instance.id, iteration, |id| self.session_log.log_path(id));
        info!("iteration {} started (session {})", iteration, session.id);
        events.emit(LoopRunnerEvent::IterationStart {
            iteration,
            session: session.clone(),
        });

        let resume = if self.config.resume_previous_session {
            state.last_agent_session.clone()
        } else {
            None
        };
        let options = AgentOptions::new(prompt, &loop_instance.target_dir)
            .model(loop_instance.config.model.clone())
            .max_turns(self.config.max_turns)
            .resume(resume)
            .skip_permissions(self.config.skip_permissions);

        // A log failure cancels only this session's token
        let session_cancel = cancel.child_token();
        let outcome = match self.launcher.launch(options, session_cancel.clone()).await {
            Ok(stream) => {
                self.stream_session(&mut session, stream, events, &session_cancel)
                    .await
            }
            Err(e) => {
                let message = format!("failed to start agent: {}", e);
                warn!("{}", message);
                self.record_quietly(&session.id, SessionLogEntry::error(&message, None), events);
                session.finish(SessionStatus::Failed);
                self.end_iteration(iteration, session, state, events);
                return Err(message);
            }
        };

        match &outcome.result {
            Some(result) => {
                session.cost_usd = result.total_cost_usd;
                session.num_turns = result.num_turns;
                session.tokens_used = result.usage.total();
                session.duration_ms = Some(result.duration_ms);
            }
            None => session.num_turns = outcome.assistant_turns,
        }

        if let Some(failure) = outcome.log_failure {
            session.finish(SessionStatus::Failed);
            self.end_iteration(iteration, session, state, events);
            return Err(format!("session log write failed: {}", failure));
        }

        let mut exit = outcome.exit.unwrap_or(ProcessExit::Exited {
            code: None,
            stderr: String::new(),
        });
        // An agent that dies after the token trips, without a result, was interrupted
        if outcome.result.is_none() && cancel.is_cancelled() {
            exit = ProcessExit::Cancelled;
        }
        let status = match (&outcome.result, exit) {
            (_, ProcessExit::Cancelled) => {
                info!("session {} interrupted", session.id);
                session.finish(SessionStatus::Interrupted);
                self.end_iteration(iteration, session, state, events);
                return Ok(());
            }
            (None, ProcessExit::Exited { code, stderr }) => {
                let mut message = match code {
                    Some(code) => format!("agent exited with status {} without a result", code),
                    None => "agent terminated by signal without a result".to_string(),
                };
                if !stderr.trim().is_empty() {
                    message.push_str(&format!(": {}", stderr.trim()));
                }
                warn!("{}", message);
                self.record_quietly(&session.id, SessionLogEntry::error(&message, None), events);
                session.finish(SessionStatus::Failed);
                self.end_iteration(iteration, session, state, events);
                return Err(message);
            }
            (Some(result), _) if result.subtype.is_error() => {
                warn!("session {} reported {}", session.id, result.subtype.as_str());
                if result.errors.is_empty() {
                    state
                        .feedback
                        .agent_errors([format!("agent stopped with {}", result.subtype.as_str())]);
                } else {
                    state.feedback.agent_errors(result.errors.clone());
                }
                SessionStatus::Failed
            }
            (Some(_), _) => SessionStatus::Completed,
        };

        let detection = self.detector.detect(&loop_instance.plan, &outcome.messages);
        session.task_worked_on = detection.worked_on.clone();
        session.finish(status);
        self.end_iteration(iteration, session, state, events);

        if cancel.is_cancelled() {
            return Ok(());
        }

        if let Some(id) = &detection.worked_on {
            loop_instance.plan.mark_in_progress(id);
        }

        let cwd = loop_instance.target_dir.clone();
        let checks = loop_instance.backpressure.for_trigger(BackpressureTrigger::EachIteration);
        self.run_checks(checks, &cwd, events, cancel, Some(&mut state.feedback))
            .await;

        for id in &detection.completed {
            if !loop_instance.plan.mark_completed(id) {
                continue;
            }
            let Some(task) = loop_instance.plan.get(id).cloned() else {
                continue;
            };
            info!("task {} completed in iteration {}", task.id, iteration);
            events.emit(LoopRunnerEvent::TaskDetected { iteration, task });
            let checks = loop_instance.backpressure.for_trigger(BackpressureTrigger::EachTask);
            self.run_checks(checks, &cwd, events, cancel, Some(&mut state.feedback))
                .await;
        }

        loop_instance.touch();
        Ok(())
    }

    async fn stream_session(
        &self,
        session: &mut Session,
        mut stream: Box<dyn AgentStream>,
        events: &EventSink,
        session_cancel: &CancellationToken,
    ) -> StreamOutcome {
        let mut outcome = StreamOutcome::default();
        while let Some(output) = stream.next_output().await {
            let entry = match output {
                AgentOutput::Message(message) => {
                    match &message {
                        StreamMessage::System(m) if m.subtype == SystemSubtype::Init => {
                            session.agent_session_id = Some(m.session_id.clone());
                        }
                        StreamMessage::Assistant(_) => outcome.assistant_turns += 1,
                        StreamMessage::Result(r) => outcome.result = Some(r.clone()),
                        _ => {}
                    }
                    outcome.messages.push(message.clone());
                    SessionLogEntry::message(message)
                }
                AgentOutput::Malformed { line, error } => {
                    warn!("malformed agent output in {}: {}", session.id, error);
                    SessionLogEntry::error(error, Some(line))
                }
                AgentOutput::Exited(exit) => {
                    debug!("session {} process exit: {:?}", session.id, exit);
                    outcome.exit = Some(exit);
                    continue;
                }
            };

            if outcome.log_failure.is_some() {
                continue;
            }
            if let Err(e) = self.record(&session.id, entry, events) {
                warn!("aborting session {}: {}", session.id, e);
                outcome.log_failure = Some(e.to_string());
                session_cancel.cancel();
            }
        }
        outcome
    }

    async fn run_checks(
        &self,
        checks: Vec<&BackpressureCheck>,
        cwd: &Path,
        events: &EventSink,
        cancel: &CancellationToken,
        mut feedback: Option<&mut Feedback>,
    ) -> bool {
        let mut all_passed = true;
        for check in checks {
            if cancel.is_cancelled() {
                debug!("skipping check '{}' after cancellation", check.name);
                return false;
            }
            events.emit(LoopRunnerEvent::BackpressureStart {
                check_name: check.name.clone(),
                trigger: check.trigger,
            });
            let result = self.checks.run(check, cwd, cancel).await;
            if result.passed {
                events.emit(LoopRunnerEvent::BackpressurePass {
                    check_name: check.name.clone(),
                });
            } else {
                all_passed = false;
                if let Some(feedback) = feedback.as_deref_mut() {
                    feedback.check_failed(&check.name, result.exit_code, &result.output, self.config.max_output_chars);
                }
                events.emit(LoopRunnerEvent::BackpressureFail {
                    check_name: check.name.clone(),
                    output: result.output,
                    exit_code: result.exit_code,
                });
            }
        }
        all_passed
    }

    fn end_iteration(&self, iteration: u32, session: Session, state: &mut RunState, events: &EventSink) {
        info!(
            "iteration {} ended: {:?}, ${:.4}, {} turns",
            iteration, session.status, session.cost_usd, session.num_turns
        );
        if session.agent_session_id.is_some() {
            state.last_agent_session = session.agent_session_id.clone();
        }
        events.emit(LoopRunnerEvent::IterationEnd {
            iteration,
            session: session.clone(),
        });
        state.sessions.push(session);
    }

    fn record(&self, session_id: &str, entry: SessionLogEntry, events: &EventSink) -> Result<()> {
        self.session_log.append(session_id, &entry)?;
        events.emit(LoopRunnerEvent::SessionLog {
            session_id: session_id.to_string(),
            entry,
        });
        Ok(())
    }

    fn record_quietly(&self, session_id: &str, entry: SessionLogEntry, events: &EventSink) {
        if let Err(e) = self.record(session_id, entry, events) {
            warn!("could not log to session {}: {}", session_id, e);
        }
    }
}
