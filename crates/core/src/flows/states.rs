use serde::{Deserialize, Serialize};

use crate::domain::slot::SlotName;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    Concierge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    Collecting,
    Ready,
    Executing,
    AwaitingConfirmation,
    Completed,
    Failed,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// States a session only passes through inside a single turn.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Ready | Self::Executing | Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    IntentSet,
    SlotsPending,
    SlotsComplete,
    ConfirmationRequested,
    ConfirmationGranted,
    ConfirmationDeclined,
    ExecutionStarted,
    ToolSucceeded,
    ToolDeclined,
    ToolFailed,
    Settled,
    RetryDeclined,
    ContextSwitched,
    Reset,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_required_slots: Vec<SlotName>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PromptForSlot,
    RequestConfirmation,
    InvokeTool,
    SynthesizeResponse,
    OfferAlternatives,
    ReportFailure,
    InvalidateDependentSlots,
    ClearSession,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationState,
    pub to: ConversationState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
