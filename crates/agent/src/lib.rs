//! Conversational runtime for the reservation concierge.
//!
//! Each turn follows a fixed loop:
//! 1. **Normalize** (`normalizer`) - canonical text from Hinglish/Devanagari input
//! 2. **Plan** (`planner`) - intent, slot updates and gaps as structured output
//! 3. **Apply** - the core state machine merges slots and picks the next step
//! 4. **Execute** (`executor`, `tools`) - bounded, retry-aware tool calls
//! 5. **Respond** (`responses`) - deterministic templates over tool results
//!
//! The planner never calls tools and never writes session state. Tools read
//! their arguments only from the session's slots.

pub mod audit;
pub mod executor;
pub mod llm;
pub mod normalizer;
pub mod planner;
pub mod prompts;
pub mod responses;
pub mod runtime;
pub mod sessions;
pub mod tools;

pub use runtime::{AgentRuntime, AgentRuntimeBuilder, TurnReply};
