use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditContext, AuditSink};
use crate::domain::intent::Intent;
use crate::domain::plan::PlannerOutput;
use crate::domain::session::Session;
use crate::domain::slot::{InvalidSlotValue, SlotName, SlotScope, SlotValue};
use crate::errors::DomainError;
use crate::flows::{
    ConciergeFlow, ConversationState, FlowContext, FlowEngine, FlowEvent, TransitionOutcome,
};
use crate::schema::{SchemaRegistry, SlotDependencyTable};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptReason {
    Missing,
    Ambiguous { candidates: Vec<String> },
    Invalid { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPrompt {
    pub intent: Intent,
    pub slot: SlotName,
    pub reason: PromptReason,
}

/// What the turn should do after the planner output has been applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnDecision {
    /// Ask for exactly one slot.
    Prompt(SlotPrompt),
    /// Nothing actionable yet; ask what the user would like to do.
    ClarifyIntent,
    /// A templated reply with no tool behind it.
    Converse(Intent),
    /// Slots are complete but the intent needs an explicit yes.
    Confirm(Intent),
    /// The user said no to a pending confirmation.
    Dismissed(Intent),
    /// The last call failed and the user has not asked to try it again.
    OfferRetry(Intent),
    /// Slots are complete; run the intent's tool.
    Execute(Intent),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotChanges {
    pub filled: Vec<SlotName>,
    pub overwritten: Vec<SlotName>,
    pub invalidated: Vec<SlotName>,
    pub rejected: Vec<InvalidSlotValue>,
}

impl SlotChanges {
    pub fn is_context_switch(&self) -> bool {
        !self.overwritten.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedPlan {
    pub decision: TurnDecision,
    pub changes: SlotChanges,
    pub previous_intent: Option<Intent>,
    pub intent_switched: bool,
}

/// How a tool call ended, from the state machine's point of view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionDisposition {
    /// Success. `produced` slots (e.g. a new reservation id) become defaults.
    Succeeded { produced: Vec<(SlotName, SlotValue)> },
    /// A normal negative answer such as no capacity; `invalidate` is re-collected.
    Declined { invalidate: Vec<SlotName> },
    /// Timeout or failure after the retry budget.
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub state: ConversationState,
    pub follow_up: Option<SlotPrompt>,
}

/// Owns the rules for applying planner output to a session.
pub struct DialogueMachine {
    schema: SchemaRegistry,
    dependencies: SlotDependencyTable,
    engine: FlowEngine<ConciergeFlow>,
}

impl Default for DialogueMachine {
    fn default() -> Self {
        Self::new(SchemaRegistry::default(), SlotDependencyTable::default())
    }
}

impl DialogueMachine {
    pub fn new(schema: SchemaRegistry, dependencies: SlotDependencyTable) -> Self {
        Self { schema, dependencies, engine: FlowEngine::default() }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn dependencies(&self) -> &SlotDependencyTable {
        &self.dependencies
    }

    pub fn apply_plan<S>(
        &self,
        session: &mut Session,
        output: &PlannerOutput,
        today: NaiveDate,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<AppliedPlan, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let previous_intent = session.active_intent;

        if session.state == ConversationState::AwaitingConfirmation {
            if let Some(pending) = previous_intent {
                if !self.leaves_confirmation(session, output, pending) {
                    let decision = match output.confirmation {
                        Some(true) => {
                            let event = FlowEvent::ConfirmationGranted;
                            self.transition(session, event, &[], sink, audit)?;
                            TurnDecision::Execute(pending)
                        }
                        Some(false) => {
                            let event = FlowEvent::ConfirmationDeclined;
                            self.transition(session, event, &[], sink, audit)?;
                            session.active_intent = None;
                            TurnDecision::Dismissed(pending)
                        }
                        None => TurnDecision::Confirm(pending),
                    };
                    return Ok(AppliedPlan {
                        decision,
                        changes: SlotChanges::default(),
                        previous_intent,
                        intent_switched: false,
                    });
                }
            }
        }

        if session.state.is_transient() {
            self.recover_abandoned_turn(session, sink, audit)?;
        }

        if session.retry_pending {
            if let Some(failed) = session.active_intent {
                if let Some(decision) = self.hold_retry(session, output, failed, sink, audit)? {
                    return Ok(AppliedPlan {
                        decision,
                        changes: SlotChanges::default(),
                        previous_intent,
                        intent_switched: false,
                    });
                }
            }
            session.retry_pending = false;
        }

        let candidate = output.intent;
        let next_intent =
            if candidate.is_actionable() { Some(candidate) } else { session.active_intent };
        let intent_switched = next_intent.is_some() && next_intent != session.active_intent;

        let mut changes = SlotChanges::default();
        if let (true, Some(intent)) = (intent_switched, next_intent) {
            let schema = &self.schema;
            let mut dropped = Vec::new();
            session.slots.retain(|slot, _| {
                let keep = slot.scope() == SlotScope::Conversation || schema.declares(intent, slot);
                if !keep {
                    dropped.push(slot);
                }
                keep
            });
            changes.invalidated.extend(dropped);
            session.active_intent = Some(intent);
        }

        self.merge_slots(session, output, today, &mut changes);

        let Some(intent) = session.active_intent else {
            let decision = if candidate == Intent::Smalltalk {
                TurnDecision::Converse(Intent::Smalltalk)
            } else {
                TurnDecision::ClarifyIntent
            };
            return Ok(AppliedPlan { decision, changes, previous_intent, intent_switched });
        };

        let context_switch = changes.is_context_switch()
            || (intent_switched && previous_intent.is_some())
            || session.state == ConversationState::AwaitingConfirmation;
        match session.state {
            ConversationState::Idle => {
                self.transition(session, FlowEvent::IntentSet, &[], sink, audit)?;
            }
            ConversationState::Collecting if !context_switch => {}
            _ => {
                self.transition(session, FlowEvent::ContextSwitched, &[], sink, audit)?;
            }
        }

        let decision = self.next_step(session, intent, output, &changes, sink, audit)?;
        Ok(AppliedPlan { decision, changes, previous_intent, intent_switched })
    }

    /// Ready -> Executing, called right before the tool is invoked.
    pub fn begin_execution<S>(
        &self,
        session: &mut Session,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        self.transition(session, FlowEvent::ExecutionStarted, &[], sink, audit)
    }

    /// Folds the transient post-execution state back into Idle or Collecting.
    pub fn settle<S>(
        &self,
        session: &mut Session,
        disposition: ExecutionDisposition,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<Settlement, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        session.retry_pending = matches!(disposition, ExecutionDisposition::Failed);
        match disposition {
            ExecutionDisposition::Succeeded { produced } => {
                self.transition(session, FlowEvent::ToolSucceeded, &[], sink, audit)?;
                for (slot, value) in produced {
                    session.slots.insert(slot, value);
                }
                self.transition(session, FlowEvent::Settled, &[], sink, audit)?;
                session.active_intent = None;
                Ok(Settlement { state: session.state, follow_up: None })
            }
            ExecutionDisposition::Declined { invalidate } => {
                self.transition(session, FlowEvent::ToolDeclined, &[], sink, audit)?;
                for slot in invalidate {
                    session.slots.remove(slot);
                }
                let follow_up = session.active_intent.and_then(|intent| {
                    self.schema.missing(intent, &session.slots).first().map(|slot| SlotPrompt {
                        intent,
                        slot: *slot,
                        reason: PromptReason::Missing,
                    })
                });
                Ok(Settlement { state: session.state, follow_up })
            }
            ExecutionDisposition::Failed => {
                self.transition(session, FlowEvent::ToolFailed, &[], sink, audit)?;
                self.transition(session, FlowEvent::Settled, &[], sink, audit)?;
                Ok(Settlement { state: session.state, follow_up: None })
            }
        }
    }

    /// Clears intent, slots and lifecycle state but keeps the turn history.
    pub fn reset<S>(
        &self,
        session: &mut Session,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<(), DomainError>
    where
        S: AuditSink + ?Sized,
    {
        self.transition(session, FlowEvent::Reset, &[], sink, audit)?;
        session.active_intent = None;
        session.retry_pending = false;
        session.slots.retain(|_, _| false);
        Ok(())
    }

    fn leaves_confirmation(
        &self,
        session: &Session,
        output: &PlannerOutput,
        pending: Intent,
    ) -> bool {
        let new_intent = output.intent.is_actionable() && output.intent != pending;
        let new_value = output
            .slot_updates
            .iter()
            .any(|(slot, value)| session.slots.get(*slot) != Some(value));
        new_intent || new_value
    }

    /// After a failed call the tool only runs again on a yes, a repeat of the
    /// same intent, or changed details. `None` lets the turn proceed normally.
    fn hold_retry<S>(
        &self,
        session: &mut Session,
        output: &PlannerOutput,
        failed: Intent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<Option<TurnDecision>, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let asked_again = output.intent == failed || output.confirmation == Some(true);
        if asked_again
            || !output.rejected_slots.is_empty()
            || self.leaves_confirmation(session, output, failed)
        {
            return Ok(None);
        }

        let decision = match output.confirmation {
            Some(false) => {
                self.transition(session, FlowEvent::RetryDeclined, &[], sink, audit)?;
                session.active_intent = None;
                session.retry_pending = false;
                TurnDecision::Dismissed(failed)
            }
            _ if output.intent == Intent::Smalltalk => TurnDecision::Converse(Intent::Smalltalk),
            _ => TurnDecision::OfferRetry(failed),
        };
        Ok(Some(decision))
    }

    fn recover_abandoned_turn<S>(
        &self,
        session: &mut Session,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<(), DomainError>
    where
        S: AuditSink + ?Sized,
    {
        if session.active_intent.is_some() {
            self.transition(session, FlowEvent::ContextSwitched, &[], sink, audit)?;
        } else {
            self.transition(session, FlowEvent::Reset, &[], sink, audit)?;
        }
        Ok(())
    }

    fn merge_slots(
        &self,
        session: &mut Session,
        output: &PlannerOutput,
        today: NaiveDate,
        changes: &mut SlotChanges,
    ) {
        changes.rejected.extend(output.rejected_slots.iter().cloned());

        let mut accepted = Vec::new();
        for (slot, value) in &output.slot_updates {
            match self.schema.validate(*slot, value, today) {
                Ok(()) => accepted.push((*slot, value.clone())),
                Err(error) => changes.rejected.push(error),
            }
        }

        let incoming: BTreeSet<SlotName> = accepted.iter().map(|(slot, _)| *slot).collect();
        for (slot, value) in &accepted {
            if session.slots.get(*slot).is_some_and(|existing| existing != value) {
                changes.overwritten.push(*slot);
            }
        }

        for slot in &changes.overwritten {
            for dependent in self.dependencies.dependents_of(*slot) {
                if incoming.contains(&dependent) {
                    continue;
                }
                if session.slots.remove(dependent).is_some()
                    && !changes.invalidated.contains(&dependent)
                {
                    changes.invalidated.push(dependent);
                }
            }
        }

        for (slot, value) in accepted {
            if session.slots.insert(slot, value).is_none() {
                changes.filled.push(slot);
            }
        }
    }

    fn next_step<S>(
        &self,
        session: &mut Session,
        intent: Intent,
        output: &PlannerOutput,
        changes: &SlotChanges,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TurnDecision, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let missing = self.schema.missing(intent, &session.slots);

        let rejection =
            changes.rejected.iter().find(|error| self.schema.declares(intent, error.slot));
        if let Some(rejection) = rejection {
            self.transition(session, FlowEvent::SlotsPending, &missing, sink, audit)?;
            return Ok(TurnDecision::Prompt(SlotPrompt {
                intent,
                slot: rejection.slot,
                reason: PromptReason::Invalid { reason: rejection.reason.clone() },
            }));
        }

        if let Some(slot) = missing.first().copied() {
            self.transition(session, FlowEvent::SlotsPending, &missing, sink, audit)?;
            let reason = output
                .ambiguity_for(slot)
                .map(|ambiguous| PromptReason::Ambiguous {
                    candidates: ambiguous.candidates.clone(),
                })
                .unwrap_or(PromptReason::Missing);
            return Ok(TurnDecision::Prompt(SlotPrompt { intent, slot, reason }));
        }

        self.transition(session, FlowEvent::SlotsComplete, &missing, sink, audit)?;
        if self.schema.requires_confirmation(intent) {
            self.transition(session, FlowEvent::ConfirmationRequested, &[], sink, audit)?;
            return Ok(TurnDecision::Confirm(intent));
        }
        Ok(TurnDecision::Execute(intent))
    }

    fn transition<S>(
        &self,
        session: &mut Session,
        event: FlowEvent,
        missing: &[SlotName],
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let context = FlowContext { missing_required_slots: missing.to_vec() };
        let outcome = self.engine.apply_with_audit(&session.state, &event, &context, sink, audit)?;
        session.state = outcome.to;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::{DialogueMachine, ExecutionDisposition, PromptReason, TurnDecision};
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::intent::Intent;
    use crate::domain::plan::{AmbiguousSlot, PlannerOutput};
    use crate::domain::reservation::ReservationId;
    use crate::domain::restaurant::RestaurantId;
    use crate::domain::session::{Session, SessionId};
    use crate::domain::slot::{SlotName, SlotValue};
    use crate::flows::ConversationState;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    fn text(value: &str) -> SlotValue {
        SlotValue::Text(value.to_string())
    }

    fn restaurant(id: &str) -> SlotValue {
        SlotValue::Restaurant(RestaurantId(id.to_string()))
    }

    fn fixture() -> (DialogueMachine, Session, InMemoryAuditSink, AuditContext) {
        (
            DialogueMachine::default(),
            Session::new(SessionId("test".to_string())),
            InMemoryAuditSink::default(),
            AuditContext::new(Some("test".to_string()), Some(1), "req-1", "dialogue"),
        )
    }

    #[test]
    fn slots_without_intent_are_kept_and_state_stays_idle() {
        let (machine, mut session, sink, audit) = fixture();
        let output = PlannerOutput::new(Intent::Unknown, 0.2)
            .with_slot(SlotName::City, text("Delhi"))
            .with_slot(SlotName::PartySize, SlotValue::Count(6));

        let applied =
            machine.apply_plan(&mut session, &output, today(), &sink, &audit).expect("apply");

        assert_eq!(applied.decision, TurnDecision::ClarifyIntent);
        assert_eq!(session.state, ConversationState::Idle);
        assert_eq!(session.slots.text(SlotName::City), Some("Delhi"));
        assert_eq!(session.slots.count(SlotName::PartySize), Some(6));
    }

    #[test]
    fn discover_with_city_and_party_is_ready_to_execute() {
        let (machine, mut session, sink, audit) = fixture();
        let output = PlannerOutput::new(Intent::Discover, 0.9)
            .with_slot(SlotName::City, text("Delhi"))
            .with_slot(SlotName::PartySize, SlotValue::Count(6));

        let applied =
            machine.apply_plan(&mut session, &output, today(), &sink, &audit).expect("apply");

        assert_eq!(applied.decision, TurnDecision::Execute(Intent::Discover));
        assert_eq!(session.state, ConversationState::Ready);
    }

    #[test]
    fn prompts_for_highest_priority_missing_slot() {
        let (machine, mut session, sink, audit) = fixture();
        let output = PlannerOutput::new(Intent::Book, 0.9)
            .with_slot(SlotName::Date, SlotValue::Date(today()));

        let applied =
            machine.apply_plan(&mut session, &output, today(), &sink, &audit).expect("apply");

        match applied.decision {
            TurnDecision::Prompt(prompt) => {
                assert_eq!(prompt.slot, SlotName::RestaurantId);
                assert_eq!(prompt.reason, PromptReason::Missing);
            }
            other => panic!("expected prompt, got {other:?}"),
        }
        assert_eq!(session.state, ConversationState::Collecting);
    }

    #[test]
    fn ambiguous_top_slot_is_prompted_with_candidates() {
        let (machine, mut session, sink, audit) = fixture();
        let mut output = PlannerOutput::new(Intent::Discover, 0.9)
            .with_slot(SlotName::PartySize, SlotValue::Count(2));
        output.ambiguous_slots.push(AmbiguousSlot {
            slot: SlotName::City,
            candidates: vec!["Delhi".to_string(), "New Delhi".to_string()],
        });

        let applied =
            machine.apply_plan(&mut session, &output, today(), &sink, &audit).expect("apply");

        assert!(matches!(
            applied.decision,
            TurnDecision::Prompt(ref prompt)
                if prompt.slot == SlotName::City
                    && matches!(
                        prompt.reason,
                        PromptReason::Ambiguous { ref candidates } if candidates.len() == 2
                    )
        ));
        assert!(!session.slots.contains(SlotName::City));
    }

    #[test]
    fn invalid_values_are_rejected_and_reprompted() {
        let (machine, mut session, sink, audit) = fixture();
        let output = PlannerOutput::new(Intent::Discover, 0.9)
            .with_slot(SlotName::City, text("Mumbai"))
            .with_slot(SlotName::PartySize, SlotValue::Count(0));

        let applied =
            machine.apply_plan(&mut session, &output, today(), &sink, &audit).expect("apply");

        assert!(matches!(
            applied.decision,
            TurnDecision::Prompt(ref prompt)
                if prompt.slot == SlotName::PartySize
                    && matches!(prompt.reason, PromptReason::Invalid { .. })
        ));
        assert!(!session.slots.contains(SlotName::PartySize));
        assert_eq!(applied.changes.rejected.len(), 1);
    }

    #[test]
    fn city_change_clears_restaurant_but_keeps_party_size() {
        let (machine, mut session, sink, audit) = fixture();
        let first = PlannerOutput::new(Intent::Book, 0.9)
            .with_slot(SlotName::City, text("Mumbai"))
            .with_slot(SlotName::PartySize, SlotValue::Count(4))
            .with_slot(SlotName::RestaurantId, restaurant("trishna-mumbai"));
        machine.apply_plan(&mut session, &first, today(), &sink, &audit).expect("first turn");

        let switch =
            PlannerOutput::new(Intent::Unknown, 0.3).with_slot(SlotName::City, text("Kolkata"));
        let applied =
            machine.apply_plan(&mut session, &switch, today(), &sink, &audit).expect("switch");

        assert_eq!(applied.changes.overwritten, vec![SlotName::City]);
        assert_eq!(applied.changes.invalidated, vec![SlotName::RestaurantId]);
        assert!(!session.slots.contains(SlotName::RestaurantId));
        assert_eq!(session.slots.count(SlotName::PartySize), Some(4));
        assert_eq!(session.active_intent, Some(Intent::Book));
        assert_eq!(session.state, ConversationState::Collecting);
        assert!(matches!(
            applied.decision,
            TurnDecision::Prompt(ref prompt) if prompt.slot == SlotName::RestaurantId
        ));
    }

    #[test]
    fn restating_same_value_is_not_a_context_switch() {
        let (machine, mut session, sink, audit) = fixture();
        let first = PlannerOutput::new(Intent::Book, 0.9)
            .with_slot(SlotName::City, text("Delhi"))
            .with_slot(SlotName::RestaurantId, restaurant("karims-delhi"));
        machine.apply_plan(&mut session, &first, today(), &sink, &audit).expect("first turn");

        let again = PlannerOutput::new(Intent::Book, 0.9).with_slot(SlotName::City, text("Delhi"));
        let applied =
            machine.apply_plan(&mut session, &again, today(), &sink, &audit).expect("again");

        assert!(applied.changes.overwritten.is_empty());
        assert!(session.slots.contains(SlotName::RestaurantId));
    }

    #[test]
    fn slots_in_same_turn_as_city_change_survive_cascade() {
        let (machine, mut session, sink, audit) = fixture();
        let first = PlannerOutput::new(Intent::Book, 0.9)
            .with_slot(SlotName::City, text("Mumbai"))
            .with_slot(SlotName::RestaurantId, restaurant("trishna-mumbai"));
        machine.apply_plan(&mut session, &first, today(), &sink, &audit).expect("first turn");

        let both = PlannerOutput::new(Intent::Book, 0.9)
            .with_slot(SlotName::City, text("Delhi"))
            .with_slot(SlotName::RestaurantId, restaurant("karims-delhi"));
        machine.apply_plan(&mut session, &both, today(), &sink, &audit).expect("second turn");

        assert_eq!(session.slots.restaurant_id(), Some(&RestaurantId("karims-delhi".to_string())));
    }

    #[test]
    fn intent_change_drops_undeclared_intent_slots_only() {
        let (machine, mut session, sink, audit) = fixture();
        let discover = PlannerOutput::new(Intent::Discover, 0.9)
            .with_slot(SlotName::City, text("Delhi"))
            .with_slot(SlotName::Cuisine, text("mughlai"));
        machine.apply_plan(&mut session, &discover, today(), &sink, &audit).expect("discover");

        let book = PlannerOutput::new(Intent::Book, 0.9)
            .with_slot(SlotName::RestaurantId, restaurant("karims-delhi"));
        let applied =
            machine.apply_plan(&mut session, &book, today(), &sink, &audit).expect("book");

        assert!(applied.intent_switched);
        assert_eq!(applied.changes.invalidated, vec![SlotName::Cuisine]);
        assert_eq!(session.slots.text(SlotName::City), Some("Delhi"));
        assert_eq!(session.active_intent, Some(Intent::Book));
    }

    #[test]
    fn cancel_waits_for_confirmation_then_executes() {
        let (machine, mut session, sink, audit) = fixture();
        let cancel = PlannerOutput::new(Intent::Cancel, 0.9).with_slot(
            SlotName::ReservationId,
            SlotValue::Reservation(ReservationId("rsv-0a1b2c3d4e5f".to_string())),
        );

        let applied =
            machine.apply_plan(&mut session, &cancel, today(), &sink, &audit).expect("cancel");
        assert_eq!(applied.decision, TurnDecision::Confirm(Intent::Cancel));
        assert_eq!(session.state, ConversationState::AwaitingConfirmation);

        let unclear = PlannerOutput::new(Intent::Unknown, 0.1);
        let applied =
            machine.apply_plan(&mut session, &unclear, today(), &sink, &audit).expect("unclear");
        assert_eq!(applied.decision, TurnDecision::Confirm(Intent::Cancel));

        let yes = PlannerOutput::new(Intent::Unknown, 0.9).with_confirmation(true);
        let applied = machine.apply_plan(&mut session, &yes, today(), &sink, &audit).expect("yes");
        assert_eq!(applied.decision, TurnDecision::Execute(Intent::Cancel));
        assert_eq!(session.state, ConversationState::Ready);
    }

    #[test]
    fn declined_confirmation_returns_to_idle() {
        let (machine, mut session, sink, audit) = fixture();
        let cancel = PlannerOutput::new(Intent::Cancel, 0.9).with_slot(
            SlotName::ReservationId,
            SlotValue::Reservation(ReservationId("rsv-0a1b2c3d4e5f".to_string())),
        );
        machine.apply_plan(&mut session, &cancel, today(), &sink, &audit).expect("cancel");

        let no = PlannerOutput::new(Intent::Unknown, 0.9).with_confirmation(false);
        let applied = machine.apply_plan(&mut session, &no, today(), &sink, &audit).expect("no");

        assert_eq!(applied.decision, TurnDecision::Dismissed(Intent::Cancel));
        assert_eq!(session.state, ConversationState::Idle);
        assert!(session.active_intent.is_none());
    }

    #[test]
    fn new_intent_during_confirmation_is_a_context_switch() {
        let (machine, mut session, sink, audit) = fixture();
        let cancel = PlannerOutput::new(Intent::Cancel, 0.9).with_slot(
            SlotName::ReservationId,
            SlotValue::Reservation(ReservationId("rsv-0a1b2c3d4e5f".to_string())),
        );
        machine.apply_plan(&mut session, &cancel, today(), &sink, &audit).expect("cancel");

        let discover =
            PlannerOutput::new(Intent::Discover, 0.9).with_slot(SlotName::City, text("Kolkata"));
        let applied =
            machine.apply_plan(&mut session, &discover, today(), &sink, &audit).expect("switch");

        assert_eq!(session.active_intent, Some(Intent::Discover));
        assert_eq!(session.state, ConversationState::Collecting);
        assert!(matches!(
            applied.decision,
            TurnDecision::Prompt(ref prompt) if prompt.slot == SlotName::PartySize
        ));
    }

    #[test]
    fn settlement_paths_follow_execution_outcome() {
        let (machine, mut session, sink, audit) = fixture();
        let book = PlannerOutput::new(Intent::Book, 0.9)
            .with_slot(SlotName::City, text("Delhi"))
            .with_slot(SlotName::PartySize, SlotValue::Count(6))
            .with_slot(SlotName::RestaurantId, restaurant("karims-delhi"))
            .with_slot(SlotName::Date, SlotValue::Date(today()))
            .with_slot(
                SlotName::Time,
                SlotValue::Time(NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default()),
            );

        let applied =
            machine.apply_plan(&mut session, &book, today(), &sink, &audit).expect("book");
        assert_eq!(applied.decision, TurnDecision::Execute(Intent::Book));

        machine.begin_execution(&mut session, &sink, &audit).expect("executing");
        assert_eq!(session.state, ConversationState::Executing);
        let failed = machine
            .settle(&mut session, ExecutionDisposition::Failed, &sink, &audit)
            .expect("failed");
        assert_eq!(failed.state, ConversationState::Collecting);
        assert_eq!(session.slots.len(), 5);

        let retry = PlannerOutput::new(Intent::Unknown, 0.8).with_confirmation(true);
        let applied =
            machine.apply_plan(&mut session, &retry, today(), &sink, &audit).expect("retry turn");
        assert_eq!(applied.decision, TurnDecision::Execute(Intent::Book));
        machine.begin_execution(&mut session, &sink, &audit).expect("executing");
        let declined = machine
            .settle(
                &mut session,
                ExecutionDisposition::Declined { invalidate: vec![SlotName::RestaurantId] },
                &sink,
                &audit,
            )
            .expect("declined");
        assert_eq!(declined.state, ConversationState::Collecting);
        assert_eq!(declined.follow_up.map(|prompt| prompt.slot), Some(SlotName::RestaurantId));
        assert_eq!(session.slots.count(SlotName::PartySize), Some(6));

        let again = PlannerOutput::new(Intent::Unknown, 0.1)
            .with_slot(SlotName::RestaurantId, restaurant("bukhara-delhi"));
        machine.apply_plan(&mut session, &again, today(), &sink, &audit).expect("new restaurant");
        machine.begin_execution(&mut session, &sink, &audit).expect("executing");
        let reservation = SlotValue::Reservation(ReservationId("rsv-00112233aabb".to_string()));
        let done = machine
            .settle(
                &mut session,
                ExecutionDisposition::Succeeded {
                    produced: vec![(SlotName::ReservationId, reservation.clone())],
                },
                &sink,
                &audit,
            )
            .expect("succeeded");
        assert_eq!(done.state, ConversationState::Idle);
        assert!(session.active_intent.is_none());
        assert_eq!(session.slots.get(SlotName::ReservationId), Some(&reservation));
        assert_eq!(session.slots.text(SlotName::City), Some("Delhi"));
    }

    fn failed_booking() -> (DialogueMachine, Session, InMemoryAuditSink, AuditContext) {
        let (machine, mut session, sink, audit) = fixture();
        let book = PlannerOutput::new(Intent::Book, 0.9)
            .with_slot(SlotName::City, text("Delhi"))
            .with_slot(SlotName::PartySize, SlotValue::Count(4))
            .with_slot(SlotName::RestaurantId, restaurant("karims-delhi"))
            .with_slot(SlotName::Date, SlotValue::Date(today()))
            .with_slot(
                SlotName::Time,
                SlotValue::Time(NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default()),
            );
        machine.apply_plan(&mut session, &book, today(), &sink, &audit).expect("book");
        machine.begin_execution(&mut session, &sink, &audit).expect("executing");
        machine.settle(&mut session, ExecutionDisposition::Failed, &sink, &audit).expect("failed");
        (machine, session, sink, audit)
    }

    #[test]
    fn failed_call_is_not_rerun_without_being_asked() {
        let (machine, mut session, sink, audit) = failed_booking();
        assert!(session.retry_pending);

        let hello = PlannerOutput::new(Intent::Smalltalk, 0.7);
        let applied =
            machine.apply_plan(&mut session, &hello, today(), &sink, &audit).expect("hello");
        assert_eq!(applied.decision, TurnDecision::Converse(Intent::Smalltalk));

        let unclear = PlannerOutput::new(Intent::Unknown, 0.1);
        let applied =
            machine.apply_plan(&mut session, &unclear, today(), &sink, &audit).expect("unclear");
        assert_eq!(applied.decision, TurnDecision::OfferRetry(Intent::Book));
        assert_eq!(session.state, ConversationState::Collecting);
        assert!(session.retry_pending);

        let again = PlannerOutput::new(Intent::Unknown, 0.8).with_confirmation(true);
        let applied =
            machine.apply_plan(&mut session, &again, today(), &sink, &audit).expect("again");
        assert_eq!(applied.decision, TurnDecision::Execute(Intent::Book));
        assert!(!session.retry_pending);
    }

    #[test]
    fn declining_a_retry_drops_the_intent_but_keeps_details() {
        let (machine, mut session, sink, audit) = failed_booking();

        let no = PlannerOutput::new(Intent::Unknown, 0.8).with_confirmation(false);
        let applied = machine.apply_plan(&mut session, &no, today(), &sink, &audit).expect("no");

        assert_eq!(applied.decision, TurnDecision::Dismissed(Intent::Book));
        assert_eq!(session.state, ConversationState::Idle);
        assert!(session.active_intent.is_none());
        assert!(!session.retry_pending);
        assert_eq!(session.slots.text(SlotName::City), Some("Delhi"));
    }

    #[test]
    fn new_details_after_failure_run_the_call_again() {
        let (machine, mut session, sink, audit) = failed_booking();

        let later = PlannerOutput::new(Intent::Unknown, 0.6).with_slot(
            SlotName::Time,
            SlotValue::Time(NaiveTime::from_hms_opt(21, 0, 0).unwrap_or_default()),
        );
        let applied =
            machine.apply_plan(&mut session, &later, today(), &sink, &audit).expect("later");

        assert_eq!(applied.decision, TurnDecision::Execute(Intent::Book));
        assert!(!session.retry_pending);
    }

    #[test]
    fn abandoned_execution_recovers_on_next_turn() {
        let (machine, mut session, sink, audit) = fixture();
        session.active_intent = Some(Intent::Discover);
        session.state = ConversationState::Executing;

        let output = PlannerOutput::new(Intent::Unknown, 0.1);
        let applied =
            machine.apply_plan(&mut session, &output, today(), &sink, &audit).expect("recover");

        assert!(matches!(
            applied.decision,
            TurnDecision::Prompt(ref prompt) if prompt.slot == SlotName::City
        ));
        assert_eq!(session.state, ConversationState::Collecting);
    }

    #[test]
    fn reset_clears_slots_and_intent() {
        let (machine, mut session, sink, audit) = fixture();
        let output =
            PlannerOutput::new(Intent::Discover, 0.9).with_slot(SlotName::City, text("Delhi"));
        machine.apply_plan(&mut session, &output, today(), &sink, &audit).expect("apply");

        machine.reset(&mut session, &sink, &audit).expect("reset");

        assert_eq!(session.state, ConversationState::Idle);
        assert!(session.slots.is_empty());
        assert!(session.active_intent.is_none());
        assert!(!sink.events_of_type("flow.transition_applied").is_empty());
    }
}
