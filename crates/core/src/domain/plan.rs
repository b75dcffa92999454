use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::intent::Intent;
use crate::domain::session::Turn;
use crate::domain::slot::{InvalidSlotValue, SlotMemory, SlotName, SlotValue};

/// Everything a planner may read for one turn. Planners never mutate session state.
#[derive(Clone, Debug)]
pub struct PlanRequest<'a> {
    pub history: &'a [Turn],
    pub canonical_text: &'a str,
    pub current_intent: Option<Intent>,
    pub current_slots: &'a SlotMemory,
    pub awaiting_confirmation: bool,
    pub today: NaiveDate,
}

/// A slot the planner saw but could not pin to one value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousSlot {
    pub slot: SlotName,
    pub candidates: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannerOutput {
    /// `Unknown` when the utterance carries no recognisable request.
    pub intent: Intent,
    pub confidence: f32,
    pub slot_updates: BTreeMap<SlotName, SlotValue>,
    pub missing_slots: Vec<SlotName>,
    pub ambiguous_slots: Vec<AmbiguousSlot>,
    pub rejected_slots: Vec<InvalidSlotValue>,
    pub confirmation: Option<bool>,
}

impl PlannerOutput {
    pub fn new(intent: Intent, confidence: f32) -> Self {
        Self {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            slot_updates: BTreeMap::new(),
            missing_slots: Vec::new(),
            ambiguous_slots: Vec::new(),
            rejected_slots: Vec::new(),
            confirmation: None,
        }
    }

    pub fn with_slot(mut self, slot: SlotName, value: SlotValue) -> Self {
        self.slot_updates.insert(slot, value);
        self
    }

    pub fn with_missing(mut self, missing: Vec<SlotName>) -> Self {
        self.missing_slots = missing;
        self
    }

    pub fn with_confirmation(mut self, confirmation: bool) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    pub fn ambiguity_for(&self, slot: SlotName) -> Option<&AmbiguousSlot> {
        self.ambiguous_slots.iter().find(|ambiguous| ambiguous.slot == slot)
    }
}
