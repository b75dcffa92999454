use thiserror::Error;

use crate::domain::slot::{InvalidSlotValue, SlotName};
use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error(transparent)]
    InvalidSlotValue(#[from] InvalidSlotValue),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures a turn can run into. Every variant turns into a reply the user can
/// act on; none of them end the session.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DialogueError {
    #[error("planner unavailable: {reason}")]
    PlannerUnavailable { reason: String },
    #[error("ambiguous value for `{slot}`: {candidates:?}")]
    AmbiguousSlot { slot: SlotName, candidates: Vec<String> },
    #[error("tool `{tool}` timed out after {attempts} attempt(s)")]
    ToolTimeout { tool: String, attempts: u32 },
    #[error("tool `{tool}` failed: {message}")]
    ToolFailure { tool: String, message: String },
    #[error("not enough seats at {restaurant_id}: {seats_available} left")]
    CapacityExceeded { restaurant_id: String, seats_available: u32 },
    #[error(transparent)]
    InvalidSlotValue(#[from] InvalidSlotValue),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl DialogueError {
    pub fn user_message(&self) -> String {
        match self {
            Self::PlannerUnavailable { .. } => {
                "Sorry, I couldn't process that just now. Could you say it again?".to_string()
            }
            Self::AmbiguousSlot { slot, candidates } => {
                format!("Which {} did you mean: {}?", slot.label(), candidates.join(", "))
            }
            Self::ToolTimeout { .. } => {
                "That is taking longer than expected. Please try again in a moment.".to_string()
            }
            Self::ToolFailure { .. } => {
                "Something went wrong on our side. Please try again.".to_string()
            }
            Self::CapacityExceeded { restaurant_id, seats_available } => format!(
                "{restaurant_id} only has {seats_available} seat(s) left at that time."
            ),
            Self::InvalidSlotValue(error) => {
                format!("That {} doesn't look right: {}.", error.slot.label(), error.reason)
            }
            Self::Domain(_) => {
                "Something went wrong on our side. Let's start that request again.".to_string()
            }
        }
    }

    /// Stable machine-readable code used in logs and CLI JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PlannerUnavailable { .. } => "planner_unavailable",
            Self::AmbiguousSlot { .. } => "ambiguous_slot",
            Self::ToolTimeout { .. } => "tool_timeout",
            Self::ToolFailure { .. } => "tool_failure",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::InvalidSlotValue(_) => "invalid_slot_value",
            Self::Domain(_) => "domain_error",
        }
    }

    /// Whether the session lands in `Failed` (and then `Collecting`) because of it.
    pub fn fails_execution(&self) -> bool {
        matches!(self, Self::ToolTimeout { .. } | Self::ToolFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::DialogueError;
    use crate::domain::slot::{InvalidSlotValue, SlotName};

    #[test]
    fn user_messages_never_leak_internal_detail() {
        let failure = DialogueError::ToolFailure {
            tool: "book_table".to_string(),
            message: "database is locked".to_string(),
        };
        assert!(!failure.user_message().contains("database"));
        assert!(failure.fails_execution());

        let planner = DialogueError::PlannerUnavailable { reason: "connect timeout".to_string() };
        assert!(!planner.user_message().contains("timeout"));
        assert!(!planner.fails_execution());
        assert_eq!(planner.code(), "planner_unavailable");
    }

    #[test]
    fn slot_errors_name_the_slot() {
        let ambiguous = DialogueError::AmbiguousSlot {
            slot: SlotName::Time,
            candidates: vec!["08:00".to_string(), "20:00".to_string()],
        };
        assert_eq!(ambiguous.user_message(), "Which time did you mean: 08:00, 20:00?");

        let invalid: DialogueError = InvalidSlotValue {
            slot: SlotName::PartySize,
            reason: "we can seat at most 20 guests per booking".to_string(),
        }
        .into();
        assert!(invalid.user_message().starts_with("That party size"));
        assert_eq!(invalid.code(), "invalid_slot_value");
    }

    #[test]
    fn capacity_message_reports_remaining_seats() {
        let error = DialogueError::CapacityExceeded {
            restaurant_id: "karims-delhi".to_string(),
            seats_available: 2,
        };
        assert!(error.user_message().contains("2 seat(s)"));
        assert!(!error.fails_execution());
    }
}
