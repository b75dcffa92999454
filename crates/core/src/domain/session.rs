use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::intent::Intent;
use crate::domain::slot::SlotMemory;
use crate::flows::states::ConversationState;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub number: u64,
    pub user_text: String,
    pub agent_text: String,
    pub occurred_at: DateTime<Utc>,
}

/// One conversation. Created on the first user message, dropped on reset;
/// nothing here outlives the process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Distinguishes this session from earlier ones that used the same id.
    pub instance: Uuid,
    pub history: Vec<Turn>,
    pub active_intent: Option<Intent>,
    pub slots: SlotMemory,
    pub state: ConversationState,
    /// The last tool call failed; it only runs again once the user asks.
    #[serde(default)]
    pub retry_pending: bool,
    pub turn_counter: u64,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            instance: Uuid::new_v4(),
            history: Vec::new(),
            active_intent: None,
            slots: SlotMemory::new(),
            state: ConversationState::Idle,
            retry_pending: false,
            turn_counter: 0,
            created_at: Utc::now(),
        }
    }

    /// Advances the monotonic turn counter and returns the new turn number.
    pub fn begin_turn(&mut self) -> u64 {
        self.turn_counter += 1;
        self.turn_counter
    }

    pub fn record_turn(
        &mut self,
        number: u64,
        user_text: impl Into<String>,
        agent_text: impl Into<String>,
    ) {
        self.history.push(Turn {
            number,
            user_text: user_text.into(),
            agent_text: agent_text.into(),
            occurred_at: Utc::now(),
        });
    }

    /// The last `window` turns, oldest first.
    pub fn recent_history(&self, window: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }
}
