pub mod audit;
pub mod config;
pub mod dialogue;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod schema;

pub use dialogue::{
    AppliedPlan, DialogueMachine, ExecutionDisposition, PromptReason, Settlement, SlotChanges,
    SlotPrompt, TurnDecision,
};
pub use domain::intent::Intent;
pub use domain::plan::{AmbiguousSlot, PlanRequest, PlannerOutput};
pub use domain::loyalty::{LoyaltyProfile, LoyaltyTier};
pub use domain::reservation::{
    CancelOutcome, CapacityKey, CapacitySlot, OperationKey, ReservationId, ReservationRecord,
    ReservationStatus, ReserveOutcome, ReserveRequest,
};
pub use domain::restaurant::{Restaurant, RestaurantFilter, RestaurantId};
pub use domain::session::{Session, SessionId, Turn};
pub use domain::slot::{InvalidSlotValue, SlotMemory, SlotName, SlotValue};
pub use errors::{DialogueError, DomainError};
pub use flows::ConversationState;
pub use schema::{IntentSchema, SchemaRegistry, SlotDependencyTable};
