//! Runs the tool behind an intent.
//!
//! Arguments come only from session slots, through the intent's route. Each
//! attempt is bounded by a timeout. A failed attempt is retried at most once,
//! and only when the tool is idempotent or deduplicates by token.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use concierge_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use concierge_core::dialogue::ExecutionDisposition;
use concierge_core::domain::intent::Intent;
use concierge_core::domain::reservation::ReservationId;
use concierge_core::domain::session::Session;
use concierge_core::domain::slot::{SlotName, SlotValue};
use concierge_core::errors::DialogueError;

use crate::tools::{DeclineReason, ToolError, ToolErrorKind, ToolRegistry, ToolResponse};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);
/// Hard ceiling on retries regardless of configuration.
pub const MAX_RETRIES: u32 = 1;

#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionOutcome {
    Completed { data: Value },
    Declined { reason: DeclineReason, data: Value, invalidate: Vec<SlotName> },
    Failed { error: DialogueError, kind: ToolErrorKind },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionReport {
    pub intent: Intent,
    pub tool: String,
    pub attempts: u32,
    pub outcome: ExecutionOutcome,
}

impl ExecutionReport {
    fn failed(
        intent: Intent,
        tool: &str,
        attempts: u32,
        kind: ToolErrorKind,
        error: DialogueError,
    ) -> Self {
        Self {
            intent,
            tool: tool.to_string(),
            attempts,
            outcome: ExecutionOutcome::Failed { error, kind },
        }
    }

    /// What the state machine should do with this result.
    pub fn disposition(&self) -> ExecutionDisposition {
        match &self.outcome {
            ExecutionOutcome::Completed { data } => {
                let produced = data
                    .get("reservation_id")
                    .and_then(Value::as_str)
                    .filter(|_| self.intent == Intent::Book)
                    .map(|id| {
                        vec![(
                            SlotName::ReservationId,
                            SlotValue::Reservation(ReservationId(id.to_string())),
                        )]
                    })
                    .unwrap_or_default();
                ExecutionDisposition::Succeeded { produced }
            }
            ExecutionOutcome::Declined { invalidate, .. } => {
                ExecutionDisposition::Declined { invalidate: invalidate.clone() }
            }
            ExecutionOutcome::Failed { .. } => ExecutionDisposition::Failed,
        }
    }
}

pub struct Executor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    max_retries: u32,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry, timeout: DEFAULT_TOOL_TIMEOUT, max_retries: MAX_RETRIES }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.min(MAX_RETRIES);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn execute<S>(
        &self,
        intent: Intent,
        session: &Session,
        sink: &S,
        audit: &AuditContext,
    ) -> ExecutionReport
    where
        S: AuditSink + ?Sized,
    {
        let report = self.run(intent, session, audit).await;

        let (outcome, label) = match &report.outcome {
            ExecutionOutcome::Completed { .. } => (AuditOutcome::Success, "completed".to_string()),
            ExecutionOutcome::Declined { reason, .. } => {
                (AuditOutcome::Rejected, reason.as_str().to_string())
            }
            ExecutionOutcome::Failed { error, .. } => {
                (AuditOutcome::Failed, error.code().to_string())
            }
        };
        sink.emit(
            AuditEvent::from_context(audit, "tool.invoked", AuditCategory::Tool, outcome)
                .with_metadata("intent", intent.as_str())
                .with_metadata("tool", report.tool.clone())
                .with_metadata("attempts", report.attempts.to_string())
                .with_metadata("result", label),
        );
        report
    }

    async fn run(
        &self,
        intent: Intent,
        session: &Session,
        audit: &AuditContext,
    ) -> ExecutionReport {
        let Some(route) = self.registry.route_for(intent) else {
            return ExecutionReport::failed(
                intent,
                "none",
                0,
                ToolErrorKind::UnknownTool,
                DialogueError::ToolFailure {
                    tool: "none".to_string(),
                    message: format!("no tool handles {intent}"),
                },
            );
        };

        let mut args = Map::new();
        for (slot, arg) in &route.arguments {
            if let Some(value) = session.slots.get(*slot) {
                args.insert((*arg).to_string(), value.to_json());
            }
        }

        let (tool, mut call) = match self.registry.prepare(route.tool, args) {
            Ok(prepared) => prepared,
            Err(error) => {
                return ExecutionReport::failed(
                    intent,
                    route.tool,
                    0,
                    error.kind(),
                    tool_failure(route.tool, &error),
                )
            }
        };
        let spec = tool.spec();
        if spec.accepts_idempotency_token {
            let token = idempotency_token(session, route.tool, &call.args);
            call = call.with_idempotency_token(token);
        }
        let max_attempts = 1 + if spec.retry_safe() { self.max_retries } else { 0 };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = tokio::time::timeout(self.timeout, tool.execute(&call)).await;
            let (kind, error) = match outcome {
                Ok(Ok(ToolResponse::Completed { data })) => {
                    info!(
                        event_name = "executor.tool.completed",
                        tool = route.tool,
                        attempts = attempt,
                        correlation_id = %audit.correlation_id,
                        "tool completed"
                    );
                    return ExecutionReport {
                        intent,
                        tool: route.tool.to_string(),
                        attempts: attempt,
                        outcome: ExecutionOutcome::Completed { data },
                    };
                }
                Ok(Ok(ToolResponse::Declined { reason, data })) => {
                    info!(
                        event_name = "executor.tool.declined",
                        tool = route.tool,
                        reason = reason.as_str(),
                        correlation_id = %audit.correlation_id,
                        "tool declined"
                    );
                    return ExecutionReport {
                        intent,
                        tool: route.tool.to_string(),
                        attempts: attempt,
                        outcome: ExecutionOutcome::Declined {
                            reason,
                            data,
                            invalidate: route.decline_invalidates.clone(),
                        },
                    };
                }
                Ok(Err(error)) if !error.is_transient() => {
                    return ExecutionReport::failed(
                        intent,
                        route.tool,
                        attempt,
                        error.kind(),
                        tool_failure(route.tool, &error),
                    );
                }
                Ok(Err(error)) => (
                    error.kind(),
                    tool_failure(route.tool, &error),
                ),
                Err(_) => (
                    ToolErrorKind::Timeout,
                    DialogueError::ToolTimeout { tool: route.tool.to_string(), attempts: attempt },
                ),
            };

            if attempt >= max_attempts {
                warn!(
                    event_name = "executor.tool.failed",
                    tool = route.tool,
                    attempts = attempt,
                    error = %error,
                    correlation_id = %audit.correlation_id,
                    "tool failed"
                );
                return ExecutionReport::failed(intent, route.tool, attempt, kind, error);
            }
            warn!(
                event_name = "executor.tool.retry",
                tool = route.tool,
                attempt = attempt,
                error = %error,
                correlation_id = %audit.correlation_id,
                "retrying tool"
            );
        }
    }
}

/// Stable per (session instance, turn, tool, arguments), so a retried booking
/// is recognised by the store instead of reserving twice. A session recreated
/// under the same id gets a new instance and never reuses an old token.
fn tool_failure(tool: &str, error: &ToolError) -> DialogueError {
    DialogueError::ToolFailure { tool: tool.to_string(), message: error.to_string() }
}

fn idempotency_token(session: &Session, tool: &str, args: &Map<String, Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session.id.0.as_bytes());
    hasher.update(b"|");
    hasher.update(session.instance.as_bytes());
    hasher.update(b"|");
    hasher.update(session.turn_counter.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(tool.as_bytes());
    hasher.update(b"|");
    hasher.update(Value::Object(args.clone()).to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use concierge_core::audit::{AuditContext, InMemoryAuditSink};
    use concierge_core::dialogue::ExecutionDisposition;
    use concierge_core::domain::intent::Intent;
    use concierge_core::domain::session::{Session, SessionId};
    use concierge_core::domain::slot::{SlotName, SlotValue};
    use concierge_core::errors::DialogueError;

    use super::{idempotency_token, ExecutionOutcome, Executor};
    use crate::tools::{
        ArgKind, ArgSpec, IntentRoute, Tool, ToolCall, ToolError, ToolErrorKind, ToolRegistry,
        ToolResponse, ToolSpec,
    };

    /// Fails the first `failures` calls, then succeeds. Optionally sleeps instead of failing.
    struct ScriptedTool {
        idempotent: bool,
        failures: u32,
        hang: bool,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for ScriptedTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "scripted",
                description: "test double",
                args: vec![ArgSpec::required("city", ArgKind::String)],
                idempotent: self.idempotent,
                accepts_idempotency_token: false,
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<ToolResponse, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                if self.hang {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                return Err(ToolError::Internal(format!("flaky call {n}")));
            }
            Ok(ToolResponse::Completed { data: json!({ "city": call.str_arg("city")? }) })
        }
    }

    fn executor(tool: ScriptedTool) -> Executor {
        let mut registry = ToolRegistry::default();
        registry.register(tool);
        registry.route(
            Intent::Discover,
            IntentRoute {
                tool: "scripted",
                arguments: vec![(SlotName::City, "city")],
                decline_invalidates: vec![],
            },
        );
        Executor::new(Arc::new(registry))
            .with_timeout(Duration::from_millis(50))
            .with_max_retries(5)
    }

    fn session() -> Session {
        let mut session = Session::new(SessionId("s-1".to_string()));
        session.turn_counter = 3;
        session.slots.insert(SlotName::City, SlotValue::Text("Pune".to_string()));
        session
    }

    fn audit() -> AuditContext {
        AuditContext::new(Some("s-1".to_string()), Some(3), "req-1", "executor")
    }

    #[tokio::test]
    async fn idempotent_tool_is_retried_exactly_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = executor(ScriptedTool {
            idempotent: true,
            failures: 1,
            hang: false,
            calls: calls.clone(),
        });
        let sink = InMemoryAuditSink::default();

        let report = executor.execute(Intent::Discover, &session(), &sink, &audit()).await;

        assert_eq!(report.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            report.outcome,
            ExecutionOutcome::Completed { ref data } if data["city"] == "Pune"
        ));
        assert_eq!(report.disposition(), ExecutionDisposition::Succeeded { produced: vec![] });
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn retry_budget_never_exceeds_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = executor(ScriptedTool {
            idempotent: true,
            failures: 10,
            hang: false,
            calls: calls.clone(),
        });

        let report = executor
            .execute(Intent::Discover, &session(), &InMemoryAuditSink::default(), &audit())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            report.outcome,
            ExecutionOutcome::Failed { error: DialogueError::ToolFailure { .. }, .. }
        ));
        assert_eq!(report.disposition(), ExecutionDisposition::Failed);
    }

    #[tokio::test]
    async fn non_idempotent_tool_without_token_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = executor(ScriptedTool {
            idempotent: false,
            failures: 1,
            hang: false,
            calls: calls.clone(),
        });

        let report = executor
            .execute(Intent::Discover, &session(), &InMemoryAuditSink::default(), &audit())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test]
    async fn slow_tool_times_out_after_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = executor(ScriptedTool {
            idempotent: true,
            failures: 10,
            hang: true,
            calls: calls.clone(),
        });

        let report = executor
            .execute(Intent::Discover, &session(), &InMemoryAuditSink::default(), &audit())
            .await;

        assert_eq!(report.attempts, 2);
        assert!(matches!(
            report.outcome,
            ExecutionOutcome::Failed {
                error: DialogueError::ToolTimeout { attempts: 2, .. },
                kind: ToolErrorKind::Timeout
            }
        ));
    }

    #[tokio::test]
    async fn missing_required_argument_never_reaches_the_tool() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = executor(ScriptedTool {
            idempotent: true,
            failures: 0,
            hang: false,
            calls: calls.clone(),
        });

        let empty = Session::new(SessionId("s-1".to_string()));
        let report = executor
            .execute(Intent::Discover, &empty, &InMemoryAuditSink::default(), &audit())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            report.outcome,
            ExecutionOutcome::Failed { kind: ToolErrorKind::InvalidArguments, .. }
        ));
    }

    #[test]
    fn token_depends_on_instance_turn_and_arguments() {
        let mut args = Map::new();
        args.insert("party_size".to_string(), Value::from(4));
        let current = session();
        let base = idempotency_token(&current, "book_table", &args);

        assert_eq!(base, idempotency_token(&current, "book_table", &args));
        let mut next_turn = current.clone();
        next_turn.turn_counter = 4;
        assert_ne!(base, idempotency_token(&next_turn, "book_table", &args));

        let recreated = session();
        assert_eq!(recreated.turn_counter, current.turn_counter);
        assert_ne!(base, idempotency_token(&recreated, "book_table", &args));

        args.insert("party_size".to_string(), Value::from(5));
        assert_ne!(base, idempotency_token(&current, "book_table", &args));
    }
}
