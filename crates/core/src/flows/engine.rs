use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::slot::SlotName;
use crate::flows::states::{
    ConversationState, FlowAction, FlowContext, FlowEvent, FlowType, TransitionOutcome,
};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> ConversationState;
    fn transition(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct ConciergeFlow;

impl FlowDefinition for ConciergeFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::Concierge
    }

    fn initial_state(&self) -> ConversationState {
        ConversationState::Idle
    }

    fn transition(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_concierge(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> ConversationState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<ConciergeFlow> {
    fn default() -> Self {
        Self::new(ConciergeFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required slots before transition from {state:?}: {missing_slots:?}")]
    MissingRequiredSlots { state: ConversationState, missing_slots: Vec<SlotName> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: ConversationState, event: FlowEvent },
}

fn transition_concierge(
    current: &ConversationState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ConversationState::{
        AwaitingConfirmation, Collecting, Completed, Executing, Failed, Idle, Ready,
    };
    use FlowAction::{
        ClearSession, InvalidateDependentSlots, InvokeTool, OfferAlternatives, PromptForSlot,
        ReportFailure, RequestConfirmation, SynthesizeResponse,
    };
    use FlowEvent::{
        ConfirmationDeclined, ConfirmationGranted, ConfirmationRequested, ContextSwitched,
        ExecutionStarted, IntentSet, Reset, RetryDeclined, Settled, SlotsComplete, SlotsPending,
        ToolDeclined, ToolFailed, ToolSucceeded,
    };

    let (to, actions) = match (current, event) {
        (_, Reset) => (Idle, vec![ClearSession]),
        (_, ContextSwitched) => (Collecting, vec![InvalidateDependentSlots]),
        (Idle, IntentSet) => (Collecting, Vec::new()),
        (Collecting, SlotsPending) => (Collecting, vec![PromptForSlot]),
        (Collecting, SlotsComplete) => {
            if !context.missing_required_slots.is_empty() {
                return Err(FlowTransitionError::MissingRequiredSlots {
                    state: *current,
                    missing_slots: context.missing_required_slots.clone(),
                });
            }
            (Ready, Vec::new())
        }
        (Ready, ConfirmationRequested) => (AwaitingConfirmation, vec![RequestConfirmation]),
        (AwaitingConfirmation, ConfirmationGranted) => (Ready, Vec::new()),
        (AwaitingConfirmation, ConfirmationDeclined) => (Idle, Vec::new()),
        (Ready, ExecutionStarted) => (Executing, vec![InvokeTool]),
        (Executing, ToolSucceeded) => (Completed, vec![SynthesizeResponse]),
        (Executing, ToolDeclined) => (Collecting, vec![OfferAlternatives, PromptForSlot]),
        (Executing, ToolFailed) => (Failed, vec![ReportFailure]),
        (Completed, Settled) => (Idle, Vec::new()),
        (Failed, Settled) => (Collecting, Vec::new()),
        (Collecting, RetryDeclined) => (Idle, Vec::new()),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
