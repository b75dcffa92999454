//! One conversational turn, end to end.
//!
//! normalize -> plan -> apply to session -> (execute tool -> settle) -> reply.
//! The planner proposes; the state machine and executor decide. No error
//! escapes a turn: every failure becomes a reply and the session survives.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use concierge_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use concierge_core::config::DialogueConfig;
use concierge_core::dialogue::{DialogueMachine, TurnDecision};
use concierge_core::domain::intent::Intent;
use concierge_core::domain::plan::PlanRequest;
use concierge_core::domain::session::{Session, SessionId};
use concierge_core::domain::slot::SlotName;
use concierge_core::errors::DialogueError;
use concierge_core::flows::ConversationState;

use crate::executor::{ExecutionOutcome, Executor, DEFAULT_TOOL_TIMEOUT, MAX_RETRIES};
use crate::normalizer::normalize;
use crate::planner::Planner;
use crate::responses::{ResponseComposer, ResponseError};
use crate::sessions::SessionStore;
use crate::tools::{notify, ToolRegistry};

pub const DEFAULT_HISTORY_WINDOW: usize = 20;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnReply {
    pub session_id: String,
    pub turn: u64,
    pub text: String,
    pub state: ConversationState,
    pub intent: Option<Intent>,
    pub tool: Option<String>,
    /// Stable code of the error the turn recovered from, if any.
    pub error: Option<&'static str>,
}

pub struct AgentRuntime {
    planner: Arc<dyn Planner>,
    machine: DialogueMachine,
    executor: Executor,
    responses: ResponseComposer,
    sessions: SessionStore,
    audit: Arc<dyn AuditSink>,
    history_window: usize,
    today: Option<NaiveDate>,
}

pub struct AgentRuntimeBuilder {
    planner: Arc<dyn Planner>,
    registry: Arc<ToolRegistry>,
    machine: DialogueMachine,
    audit: Arc<dyn AuditSink>,
    history_window: usize,
    tool_timeout: Duration,
    tool_max_retries: u32,
    today: Option<NaiveDate>,
}

impl AgentRuntimeBuilder {
    pub fn machine(mut self, machine: DialogueMachine) -> Self {
        self.machine = machine;
        self
    }

    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn tool_max_retries(mut self, retries: u32) -> Self {
        self.tool_max_retries = retries;
        self
    }

    /// Pins "today" for relative dates. Defaults to the local date per turn.
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Applies the `[dialogue]` settings that live outside the planner.
    pub fn dialogue_config(self, config: &DialogueConfig) -> Self {
        self.history_window(config.history_window)
            .tool_timeout(config.tool_timeout())
            .tool_max_retries(config.tool_max_retries)
    }

    pub fn build(self) -> Result<AgentRuntime, ResponseError> {
        Ok(AgentRuntime {
            planner: self.planner,
            machine: self.machine,
            executor: Executor::new(self.registry)
                .with_timeout(self.tool_timeout)
                .with_max_retries(self.tool_max_retries),
            responses: ResponseComposer::new()?,
            sessions: SessionStore::default(),
            audit: self.audit,
            history_window: self.history_window,
            today: self.today,
        })
    }
}

impl AgentRuntime {
    pub fn builder(planner: Arc<dyn Planner>, registry: Arc<ToolRegistry>) -> AgentRuntimeBuilder {
        AgentRuntimeBuilder {
            planner,
            registry,
            machine: DialogueMachine::default(),
            audit: Arc::new(NoopAuditSink),
            history_window: DEFAULT_HISTORY_WINDOW,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            tool_max_retries: MAX_RETRIES,
            today: None,
        }
    }

    pub fn planner_name(&self) -> &'static str {
        self.planner.name()
    }

    /// The registry behind every turn, for direct calls outside a conversation.
    pub fn tools(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    pub async fn session(&self, session_id: &SessionId) -> Option<Session> {
        self.sessions.snapshot(session_id).await
    }

    pub async fn handle_turn(&self, session_id: &SessionId, text: &str) -> TurnReply {
        let handle = self.sessions.get_or_create(session_id).await;
        let mut session = handle.lock().await;

        let turn = session.begin_turn();
        let audit = turn_context(session_id, turn);
        let canonical = normalize(text);
        self.audit.emit(
            AuditEvent::from_context(
                &audit,
                "turn.received",
                AuditCategory::Ingress,
                AuditOutcome::Success,
            )
            .with_metadata("chars", text.chars().count().to_string()),
        );

        let mut reply = TurnReply {
            session_id: session_id.0.clone(),
            turn,
            text: String::new(),
            state: session.state,
            intent: None,
            tool: None,
            error: None,
        };
        match self.run_turn(&mut session, &canonical, &audit, &mut reply).await {
            Ok(text) => reply.text = text,
            Err(error) => {
                warn!(
                    event_name = "runtime.turn.recovered",
                    session_id = %session_id,
                    turn,
                    code = error.code(),
                    error = %error,
                    correlation_id = %audit.correlation_id,
                    "turn ended with a recoverable error"
                );
                if matches!(error, DialogueError::Domain(_)) {
                    let reset = self.machine.reset(&mut session, self.audit.as_ref(), &audit);
                    if let Err(reset_error) = reset {
                        warn!(
                            event_name = "runtime.reset.failed",
                            error = %reset_error,
                            "session reset failed"
                        );
                    }
                }
                reply.error = Some(error.code());
                reply.text = self.responses.error(&error);
            }
        }

        reply.state = session.state;
        reply.intent = session.active_intent.or(reply.intent);
        session.record_turn(turn, text, reply.text.clone());
        info!(
            event_name = "runtime.turn.completed",
            session_id = %session_id,
            turn,
            state = session.state.as_str(),
            tool = reply.tool.as_deref().unwrap_or("-"),
            correlation_id = %audit.correlation_id,
            "turn completed"
        );
        reply
    }

    /// Ends the session. The next turn with the same id starts a fresh one.
    pub async fn reset_session(&self, session_id: &SessionId) -> TurnReply {
        let mut turn = 0;
        if let Some(handle) = self.sessions.get(session_id).await {
            let mut session = handle.lock().await;
            turn = session.turn_counter;
            let audit = turn_context(session_id, turn);
            if let Err(error) = self.machine.reset(&mut session, self.audit.as_ref(), &audit) {
                warn!(event_name = "runtime.reset.failed", error = %error, "session reset failed");
            }
            self.sessions.remove(session_id).await;
            info!(
                event_name = "runtime.session.reset",
                session_id = %session_id,
                turns = turn,
                correlation_id = %audit.correlation_id,
                "session destroyed"
            );
        }

        TurnReply {
            session_id: session_id.0.clone(),
            turn,
            text: "Starting fresh. What would you like to do?".to_string(),
            state: ConversationState::Idle,
            intent: None,
            tool: None,
            error: None,
        }
    }

    async fn run_turn(
        &self,
        session: &mut Session,
        canonical: &str,
        audit: &AuditContext,
        reply: &mut TurnReply,
    ) -> Result<String, DialogueError> {
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let output = {
            let request = PlanRequest {
                history: session.recent_history(self.history_window),
                canonical_text: canonical,
                current_intent: session.active_intent,
                current_slots: &session.slots,
                awaiting_confirmation: session.state == ConversationState::AwaitingConfirmation
                    || session.retry_pending,
                today,
            };
            self.planner.plan(&request).await.map_err(DialogueError::from)?
        };
        self.audit.emit(
            AuditEvent::from_context(
                audit,
                "planner.output",
                AuditCategory::Planner,
                AuditOutcome::Success,
            )
            .with_metadata("planner", self.planner.name())
                .with_metadata("intent", output.intent.as_str())
                .with_metadata("confidence", format!("{:.2}", output.confidence))
                .with_metadata("slots", output.slot_updates.len().to_string()),
        );

        let applied = self.machine.apply_plan(session, &output, today, self.audit.as_ref(), audit)?;
        let acknowledgement = self.responses.acknowledge(&applied.changes, &session.slots);
        let with_ack = |text: String| match &acknowledgement {
            Some(ack) => format!("{ack} {text}"),
            None => text,
        };

        let text = match applied.decision {
            TurnDecision::Prompt(prompt) => with_ack(self.responses.slot_prompt(&prompt)),
            TurnDecision::ClarifyIntent => self.responses.clarify(),
            TurnDecision::Converse(_) => self.responses.smalltalk(canonical),
            TurnDecision::Confirm(intent) => {
                with_ack(self.responses.confirm(intent, &session.slots))
            }
            TurnDecision::OfferRetry(intent) => {
                reply.intent = Some(intent);
                self.responses.offer_retry(intent)
            }
            TurnDecision::Dismissed(intent) => {
                reply.intent = Some(intent);
                self.responses.dismissed(intent)
            }
            TurnDecision::Execute(intent) => {
                reply.intent = Some(intent);
                self.machine.begin_execution(session, self.audit.as_ref(), audit)?;
                let report =
                    self.executor.execute(intent, session, self.audit.as_ref(), audit).await;
                reply.tool = Some(report.tool.clone());
                if let ExecutionOutcome::Failed { error, .. } = &report.outcome {
                    reply.error = Some(error.code());
                }

                let text = self.responses.execution(&report);
                let completed = matches!(report.outcome, ExecutionOutcome::Completed { .. });
                if intent == Intent::Book && completed {
                    self.notify_booking(session, &text, audit).await;
                }
                self.machine.settle(session, report.disposition(), self.audit.as_ref(), audit)?;
                with_ack(text)
            }
        };
        Ok(text)
    }

    /// Best-effort SMS after a booking; a failure never changes the reply.
    async fn notify_booking(&self, session: &Session, message: &str, audit: &AuditContext) {
        let Some(phone) = session.slots.get(SlotName::CustomerPhone) else {
            return;
        };
        let mut args = Map::new();
        args.insert("phone".to_string(), phone.to_json());
        args.insert("message".to_string(), Value::from(message));

        let registry = self.executor.registry();
        if registry.get(notify::NAME).is_none() {
            return;
        }
        if let Err(error) = registry.invoke(notify::NAME, args).await {
            warn!(
                event_name = "runtime.notify.failed",
                error = %error,
                correlation_id = %audit.correlation_id,
                "booking notification failed"
            );
        }
    }
}

fn turn_context(session_id: &SessionId, turn: u64) -> AuditContext {
    AuditContext::new(Some(session_id.0.clone()), Some(turn), Uuid::new_v4().to_string(), "runtime")
}
