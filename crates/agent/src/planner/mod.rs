//! Turns canonical text plus session context into a [`PlannerOutput`].
//!
//! Planners are read-only with respect to the session. Two variants share the
//! same contract: [`RulePlanner`] (deterministic extraction) and
//! [`CompletionPlanner`] (backed by an [`LlmClient`](crate::llm::LlmClient)).

use async_trait::async_trait;
use thiserror::Error;

use concierge_core::domain::intent::Intent;
use concierge_core::domain::plan::{PlanRequest, PlannerOutput};
use concierge_core::domain::slot::SlotScope;
use concierge_core::errors::DialogueError;
use concierge_core::schema::SchemaRegistry;

pub mod completion;
pub mod directory;
pub mod rules;

pub use completion::CompletionPlanner;
pub use directory::RestaurantDirectory;
pub use rules::RulePlanner;

pub const DEFAULT_INTENT_SWITCH_THRESHOLD: f32 = 0.75;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("planner unavailable: {reason}")]
    Unavailable { reason: String },
}

impl From<PlannerError> for DialogueError {
    fn from(error: PlannerError) -> Self {
        match error {
            PlannerError::Unavailable { reason } => DialogueError::PlannerUnavailable { reason },
        }
    }
}

#[async_trait]
pub trait Planner: Send + Sync {
    fn name(&self) -> &'static str;

    async fn plan(&self, request: &PlanRequest<'_>) -> Result<PlannerOutput, PlannerError>;
}

/// Keeps an active intent unless a different one is stated with enough confidence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntentGuard {
    threshold: f32,
}

impl Default for IntentGuard {
    fn default() -> Self {
        Self::new(DEFAULT_INTENT_SWITCH_THRESHOLD)
    }
}

impl IntentGuard {
    pub fn new(threshold: f32) -> Self {
        Self { threshold: threshold.clamp(0.0, 1.0) }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn apply(&self, current: Option<Intent>, mut output: PlannerOutput) -> PlannerOutput {
        if let Some(active) = current {
            let switching = output.intent.is_actionable() && output.intent != active;
            if switching && output.confidence < self.threshold {
                output.intent = Intent::Unknown;
            }
        }
        output
    }
}

/// Fills `missing_slots` for the intent the output will leave active.
pub(crate) fn complete_missing(
    schema: &SchemaRegistry,
    request: &PlanRequest<'_>,
    mut output: PlannerOutput,
) -> PlannerOutput {
    let effective =
        if output.intent.is_actionable() { Some(output.intent) } else { request.current_intent };
    let Some(intent) = effective else {
        output.missing_slots.clear();
        return output;
    };

    let mut merged = request.current_slots.clone();
    if effective != request.current_intent {
        merged.retain(|slot, _| {
            slot.scope() == SlotScope::Conversation
                || schema.declares(intent, slot)
        });
    }
    for (slot, value) in &output.slot_updates {
        merged.insert(*slot, value.clone());
    }
    output.missing_slots = schema.missing(intent, &merged);
    output
}

#[cfg(test)]
mod tests {
    use concierge_core::domain::intent::Intent;
    use concierge_core::domain::plan::PlannerOutput;
    use concierge_core::errors::DialogueError;

    use super::{IntentGuard, PlannerError};

    #[test]
    fn weak_switch_is_suppressed_while_intent_is_active() {
        let guard = IntentGuard::default();
        let output = guard.apply(Some(Intent::Discover), PlannerOutput::new(Intent::Book, 0.6));
        assert_eq!(output.intent, Intent::Unknown);
    }

    #[test]
    fn confident_switch_is_kept() {
        let guard = IntentGuard::default();
        let output = guard.apply(Some(Intent::Discover), PlannerOutput::new(Intent::Book, 0.9));
        assert_eq!(output.intent, Intent::Book);
    }

    #[test]
    fn without_active_intent_any_confidence_is_accepted() {
        let guard = IntentGuard::new(0.75);
        let output = guard.apply(None, PlannerOutput::new(Intent::Discover, 0.3));
        assert_eq!(output.intent, Intent::Discover);
    }

    #[test]
    fn unavailable_maps_to_dialogue_error() {
        let error: DialogueError =
            PlannerError::Unavailable { reason: "timeout".to_string() }.into();
        assert!(matches!(error, DialogueError::PlannerUnavailable { .. }));
    }
}
