//! Session lifecycle: the turn loop, termination rules, and bounded
//! restart-from-summary when the hard ceiling is hit.

use std::sync::Arc;
use std::time::Duration;

use sirocco_llm::{LlmProvider, Message, Role, Summarizer};
use sirocco_tools::{AuditLogger, ToolExecutor};

use crate::compactor::HistoryCompactor;
use crate::config::Config;
use crate::error::SessionError;
use crate::gate::ToolOutputGate;
use crate::history::HistoryLog;
use crate::meter::TokenMeter;
use crate::plan::{CodeFragment, ExecutionPlanGate, FragmentJudge, extract_fragments};

const STOP_MARKER: &str = "TERMINATE";

/// Token thresholds for one session.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    /// Crossing this triggers in-place compaction.
    pub soft_threshold: usize,
    /// Exceeding this forces a restart from a summary seed.
    pub hard_ceiling: usize,
    /// Most recent messages never rewritten by compaction.
    pub keep_tail: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Compacting,
    AwaitingRestart,
    Reseeding,
    Terminated,
}

#[derive(Debug, Clone, Copy)]
struct RestartState {
    count: u32,
    max_restarts: u32,
    pending: bool,
}

impl RestartState {
    fn new(max_restarts: u32) -> Self {
        Self {
            count: 0,
            max_restarts,
            pending: false,
        }
    }
}

/// Drives one session's history, budget, and restart accounting.
pub struct SessionController<M: TokenMeter> {
    meter: M,
    hard_ceiling: usize,
    compactor: HistoryCompactor<M>,
    history: HistoryLog,
    state: SessionState,
    restart: RestartState,
    turns_consumed: usize,
    task: String,
}

impl<M: TokenMeter + Clone> SessionController<M> {
    pub fn new(meter: M, budget: TokenBudget, max_restarts: u32) -> Self {
        let compactor =
            HistoryCompactor::new(meter.clone(), budget.soft_threshold, budget.keep_tail);
        Self {
            meter,
            hard_ceiling: budget.hard_ceiling,
            compactor,
            history: HistoryLog::new(),
            state: SessionState::Running,
            restart: RestartState::new(max_restarts),
            turns_consumed: 0,
            task: String::new(),
        }
    }

    #[must_use]
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.compactor = self.compactor.with_audit(logger);
        self
    }
}

impl<M: TokenMeter> SessionController<M> {
    /// Start a fresh session on `task`, clearing history and restart state.
    pub fn begin(&mut self, task: &str) {
        self.task = task.to_string();
        self.history.replace(vec![Message::new(Role::User, task)]);
        self.state = SessionState::Running;
        self.restart = RestartState::new(self.restart.max_restarts);
        self.turns_consumed = 0;
    }

    pub fn append(&mut self, message: Message) {
        self.history.push(message);
    }

    #[must_use]
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn restart_count(&self) -> u32 {
        self.restart.count
    }

    #[must_use]
    pub fn turns_consumed(&self) -> usize {
        self.turns_consumed
    }

    #[must_use]
    pub fn total_tokens(&self) -> usize {
        self.history.total_tokens(&self.meter)
    }

    /// Decide whether the session ends after this assistant message.
    ///
    /// Completion (empty reply or stop marker, with no tool activity)
    /// terminates outright. Blowing the hard ceiling instead marks a
    /// restart as pending for [`Self::try_restart`] to resolve.
    pub fn should_terminate(&mut self, message: &Message, has_tool_activity: bool) -> bool {
        if !has_tool_activity && message.content.trim().is_empty() {
            tracing::info!("empty assistant reply with no tool activity, session complete");
            self.state = SessionState::Terminated;
            return true;
        }
        if !has_tool_activity && has_stop_marker(&message.content) {
            tracing::info!("stop marker seen, session complete");
            self.state = SessionState::Terminated;
            return true;
        }

        // The incoming message has not been appended yet; price it in so
        // a breach is caught on the turn that causes it. It also counts
        // as a consumed turn, on top of everything after the task seed.
        let total = self.total_tokens() + self.meter.count(&message.content);
        if total > self.hard_ceiling {
            self.turns_consumed += self.history.len();
            self.restart.pending = true;
            self.state = SessionState::AwaitingRestart;
            tracing::warn!(
                total,
                ceiling = self.hard_ceiling,
                turns_consumed = self.turns_consumed,
                "hard ceiling exceeded, restart pending"
            );
            return true;
        }
        false
    }

    /// Compact in place once the soft threshold is crossed.
    pub async fn after_turn<S: Summarizer>(&mut self, summarizer: &S) {
        self.state = SessionState::Compacting;
        let result = self
            .compactor
            .maybe_compact(&self.task, &mut self.history, summarizer)
            .await;
        if let Err(e) = result {
            tracing::warn!("compaction failed, continuing with full history: {e}");
        }
        self.state = SessionState::Running;
    }

    /// Resolve a pending restart: reseed from a summary if the budget
    /// allows, otherwise terminate.
    ///
    /// Returns `true` when the session should run another round of turns.
    pub async fn try_restart<S: Summarizer>(&mut self, summarizer: &S) -> bool {
        if !self.restart.pending {
            if self.state != SessionState::Terminated {
                self.state = SessionState::Terminated;
            }
            return false;
        }
        self.restart.pending = false;

        if self.restart.count >= self.restart.max_restarts {
            tracing::warn!(
                restarts = self.restart.count,
                "restart budget exhausted, terminating with best result so far"
            );
            self.state = SessionState::Terminated;
            return false;
        }

        self.state = SessionState::Reseeding;
        match summarizer
            .summarize_messages(&self.task, self.history.messages())
            .await
        {
            Ok(seed) => {
                self.restart.count += 1;
                self.history.replace(seed);
                self.state = SessionState::Running;
                tracing::info!(
                    restart = self.restart.count,
                    seed_messages = self.history.len(),
                    "session reseeded from summary"
                );
                true
            }
            Err(e) => {
                tracing::warn!("restart summarization failed, terminating: {e}");
                self.state = SessionState::Terminated;
                false
            }
        }
    }
}

/// Does the reply end with a genuine stop marker?
///
/// The marker only counts at the very end of the reply (under 3 chars
/// of trailing text) and outside code fences, so a reply that merely
/// mentions it keeps the session alive.
fn has_stop_marker(content: &str) -> bool {
    let Some(pos) = content.rfind(STOP_MARKER) else {
        return false;
    };
    let trailing = content[pos + STOP_MARKER.len()..].trim_end();
    if trailing.chars().count() >= 3 {
        return false;
    }
    // Odd fence count before the marker means it sits inside a code block.
    content[..pos].matches("```").count() % 2 == 0
}

/// Final answer text with the stop marker removed.
///
/// Removes from the last marker occurrence onward, but only when that
/// occurrence actually counts as a stop, so the short residue
/// [`has_stop_marker`] tolerates (a trailing `.` or `>`) never leaks
/// into the answer and a mid-reply mention stays untouched.
fn strip_stop_marker(text: &str) -> String {
    let trimmed = text.trim_end();
    if !has_stop_marker(trimmed) {
        return trimmed.to_string();
    }
    let Some(pos) = trimmed.rfind(STOP_MARKER) else {
        return trimmed.to_string();
    };
    let head = &trimmed[..pos];
    let head = head.strip_suffix('<').unwrap_or(head);
    head.trim_end().to_string()
}

/// The full loop: chat, plan fragments, run tools, gate output,
/// compact, and restart within budget.
pub struct SessionRunner<M: TokenMeter, P, S, J, T> {
    provider: P,
    summarizer: S,
    plan_gate: ExecutionPlanGate<J>,
    tools: T,
    gate: ToolOutputGate<M>,
    controller: SessionController<M>,
    max_turns: usize,
    llm_timeout: Duration,
}

impl<M, P, S, J, T> SessionRunner<M, P, S, J, T>
where
    M: TokenMeter + Clone,
    P: LlmProvider,
    S: Summarizer,
    J: FragmentJudge,
    T: ToolExecutor,
{
    pub fn new(meter: M, provider: P, summarizer: S, judge: J, tools: T, config: &Config) -> Self {
        let budget = config.budget.budget();
        Self {
            provider,
            summarizer,
            plan_gate: ExecutionPlanGate::new(judge),
            tools,
            gate: ToolOutputGate::new(meter.clone(), config.budget.tool_output_token_limit),
            controller: SessionController::new(meter, budget, config.budget.max_restarts),
            max_turns: config.session.max_turns,
            llm_timeout: Duration::from_secs(config.session.llm_timeout_secs),
        }
    }

    #[must_use]
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.gate = self.gate.with_audit(Arc::clone(&logger));
        self.controller = self.controller.with_audit(logger);
        self
    }

    #[must_use]
    pub fn controller(&self) -> &SessionController<M> {
        &self.controller
    }

    /// Run the task to completion, restarting from summaries within
    /// the restart budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the task is empty or the provider fails.
    pub async fn run(&mut self, task: &str) -> Result<String, SessionError> {
        if task.trim().is_empty() {
            return Err(SessionError::NoTask);
        }
        self.controller.begin(task);

        loop {
            let answer = self.run_turns().await?;
            if !self.controller.try_restart(&self.summarizer).await {
                return Ok(answer);
            }
        }
    }

    async fn run_turns(&mut self) -> Result<String, SessionError> {
        let mut answer = String::new();

        for turn in 0..self.max_turns {
            let messages = self.controller.history().messages().to_vec();
            let response =
                match tokio::time::timeout(self.llm_timeout, self.provider.chat(&messages)).await {
                    Ok(Ok(response)) => response,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => {
                        tracing::warn!(turn, "LLM call timed out, ending this round");
                        break;
                    }
                };

            let fragments = extract_fragments(&response);
            let planned = self.plan_gate.plan(fragments).await;
            let has_tool_activity = !planned.is_empty();

            if !response.trim().is_empty() {
                answer = strip_stop_marker(&response);
            }
            let message = Message::new(Role::Assistant, response);
            let done = self.controller.should_terminate(&message, has_tool_activity);
            self.controller.append(message);
            if done {
                break;
            }

            for fragment in &planned {
                self.execute_fragment(fragment).await?;
            }
            self.controller.after_turn(&self.summarizer).await;
        }

        Ok(answer)
    }

    async fn execute_fragment(&mut self, fragment: &CodeFragment) -> Result<(), SessionError> {
        for (tool, params) in fragment_invocations(fragment) {
            let raw = match self.tools.run_tool(&tool, &params).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(tool = %tool, "tool dispatch failed: {e}");
                    format!("[error] {e}")
                }
            };

            let body = match self
                .gate
                .maybe_compress(&tool, &params, &raw, &self.summarizer)
                .await
            {
                Some(summary) => format!("[compressed]\n{summary}"),
                None => raw,
            };

            self.controller
                .append(Message::tool(&tool, format!("[tool output: {tool}]\n```\n{body}\n```")));
        }
        Ok(())
    }
}

/// Map a planned fragment to concrete tool invocations.
///
/// Shell-flavored fragments run directly. Python fragments are written
/// to their target file (or a scratch name) and then run. Anything
/// else is treated as illustrative and skipped.
fn fragment_invocations(fragment: &CodeFragment) -> Vec<(String, serde_json::Value)> {
    match fragment.language.as_str() {
        "bash" | "sh" | "shell" | "" => {
            vec![(
                "shell".into(),
                serde_json::json!({ "command": fragment.code }),
            )]
        }
        "python" | "py" => {
            let path = fragment
                .target_file
                .clone()
                .unwrap_or_else(|| format!("sirocco_fragment_{}.py", fragment.index));
            vec![
                (
                    "write_file".into(),
                    serde_json::json!({
                        "path": path,
                        "content": fragment.code,
                        "overwrite": true,
                    }),
                ),
                (
                    "shell".into(),
                    serde_json::json!({ "command": format!("python3 {path}") }),
                ),
            ]
        }
        other => {
            tracing::debug!(language = other, "fragment language not executable, skipping");
            Vec::new()
        }
    }
}
