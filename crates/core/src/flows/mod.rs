pub mod engine;
pub mod states;

pub use engine::{ConciergeFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{
    ConversationState, FlowAction, FlowContext, FlowEvent, FlowType, TransitionOutcome,
};
