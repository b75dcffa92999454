//! Deterministic reply text.
//!
//! Tool results are rendered through Tera templates in `templates/responses/`.
//! Slot questions and fixed replies are plain strings.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use serde_json::{Map, Value};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::warn;

use concierge_core::dialogue::{PromptReason, SlotChanges, SlotPrompt};
use concierge_core::domain::intent::Intent;
use concierge_core::domain::slot::{SlotMemory, SlotName};
use concierge_core::errors::DialogueError;

use crate::executor::{ExecutionOutcome, ExecutionReport};

const DISCOVER: &str = "discover.txt";
const AVAILABILITY: &str = "availability.txt";
const BOOKED: &str = "booked.txt";
const CANCELLED: &str = "cancelled.txt";
const LOYALTY: &str = "loyalty.txt";
const DECLINED: &str = "declined.txt";
const CONFIRM_CANCEL: &str = "confirm_cancel.txt";

const HELP: &str = "I can find restaurants, check table availability, \
book or cancel a reservation, and look up your loyalty profile. What would you like to do?";
const FALLBACK: &str = "Done.";

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response template error: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Clone, Debug)]
pub struct ResponseComposer {
    tera: Tera,
}

impl ResponseComposer {
    pub fn new() -> Result<Self, ResponseError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (DISCOVER, include_str!("../../../templates/responses/discover.txt.tera")),
            (AVAILABILITY, include_str!("../../../templates/responses/availability.txt.tera")),
            (BOOKED, include_str!("../../../templates/responses/booked.txt.tera")),
            (CANCELLED, include_str!("../../../templates/responses/cancelled.txt.tera")),
            (LOYALTY, include_str!("../../../templates/responses/loyalty.txt.tera")),
            (DECLINED, include_str!("../../../templates/responses/declined.txt.tera")),
            (CONFIRM_CANCEL, include_str!("../../../templates/responses/confirm_cancel.txt.tera")),
        ])?;
        register_filters(&mut tera);
        Ok(Self { tera })
    }

    pub fn slot_prompt(&self, prompt: &SlotPrompt) -> String {
        let question = slot_question(prompt.intent, prompt.slot);
        match &prompt.reason {
            PromptReason::Missing => question.to_string(),
            PromptReason::Ambiguous { candidates } => DialogueError::AmbiguousSlot {
                slot: prompt.slot,
                candidates: candidates.clone(),
            }
            .user_message(),
            PromptReason::Invalid { reason } => {
                format!("That {} doesn't look right: {reason}. {question}", prompt.slot.label())
            }
        }
    }

    pub fn clarify(&self) -> String {
        HELP.to_string()
    }

    pub fn smalltalk(&self, canonical_text: &str) -> String {
        let mentions = |words: &[&str]| words.iter().any(|word| canonical_text.contains(word));
        if mentions(&["thanks", "thank", "shukriya", "dhanyavad"]) {
            "You're welcome! Anything else I can help with?".to_string()
        } else if mentions(&["bye", "goodbye"]) {
            "Goodbye, enjoy your meal!".to_string()
        } else {
            format!("Hello! {HELP}")
        }
    }

    pub fn confirm(&self, intent: Intent, slots: &SlotMemory) -> String {
        match intent {
            Intent::Cancel => {
                let mut data = Map::new();
                if let Some(id) = slots.get(SlotName::ReservationId) {
                    data.insert("reservation_id".to_string(), id.to_json());
                }
                self.render(CONFIRM_CANCEL, Value::Object(data))
            }
            other => {
                format!("Shall I go ahead with {}? (yes/no)", other.as_str().replace('_', " "))
            }
        }
    }

    pub fn dismissed(&self, intent: Intent) -> String {
        match intent {
            Intent::Cancel => {
                "Okay, I won't cancel it. Your reservation stays as it is.".to_string()
            }
            _ => "Okay, I won't go ahead with that.".to_string(),
        }
    }

    pub fn offer_retry(&self, intent: Intent) -> String {
        let what = match intent {
            Intent::Book => "booking",
            Intent::Cancel => "cancellation",
            _ => "last request",
        };
        format!(
            "Your {what} didn't go through. \
             Say \"try again\" to retry, or tell me what to change."
        )
    }

    /// Short acknowledgement when the user replaced earlier values.
    pub fn acknowledge(&self, changes: &SlotChanges, slots: &SlotMemory) -> Option<String> {
        let updated = changes
            .overwritten
            .iter()
            .filter_map(|slot| slots.get(*slot).map(|value| format!("{} to {value}", slot.label())))
            .collect::<Vec<_>>();
        (!updated.is_empty()).then(|| format!("Got it, changed {}.", updated.join(" and ")))
    }

    pub fn execution(&self, report: &ExecutionReport) -> String {
        match &report.outcome {
            ExecutionOutcome::Completed { data } => {
                let template = match report.intent {
                    Intent::Discover => DISCOVER,
                    Intent::CheckAvailability => AVAILABILITY,
                    Intent::Book => BOOKED,
                    Intent::Cancel => CANCELLED,
                    Intent::LoyaltyInfo => LOYALTY,
                    Intent::Smalltalk | Intent::Unknown => return FALLBACK.to_string(),
                };
                self.render(template, data.clone())
            }
            ExecutionOutcome::Declined { reason, data, .. } => {
                let mut context = match data {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                context.insert("reason".to_string(), Value::from(reason.as_str()));
                context.insert("intent".to_string(), Value::from(report.intent.as_str()));
                self.render(DECLINED, Value::Object(context))
            }
            ExecutionOutcome::Failed { error, .. } => self.error(error),
        }
    }

    pub fn error(&self, error: &DialogueError) -> String {
        if error.fails_execution() {
            format!("{} I've kept your details, so just say \"try again\".", error.user_message())
        } else {
            error.user_message()
        }
    }

    fn render(&self, template: &str, data: Value) -> String {
        let rendered =
            Context::from_value(data).and_then(|context| self.tera.render(template, &context));
        match rendered {
            Ok(text) => text.trim().to_string(),
            Err(error) => {
                warn!(
                    event_name = "responses.render.failed",
                    template,
                    error = %error,
                    "response template failed"
                );
                FALLBACK.to_string()
            }
        }
    }
}

fn slot_question(intent: Intent, slot: SlotName) -> &'static str {
    match slot {
        SlotName::City => "Which city are you looking in?",
        SlotName::PartySize => "How many people will be dining?",
        SlotName::Date => "For which date?",
        SlotName::Time => "What time would you like?",
        SlotName::RestaurantId if intent == Intent::CheckAvailability => {
            "Which restaurant should I check?"
        }
        SlotName::RestaurantId => "Which restaurant would you like?",
        SlotName::Cuisine => "Any cuisine in mind?",
        SlotName::ReservationId => "What's the reservation id? It starts with rsv-.",
        SlotName::CustomerName => "What name should the booking be under?",
        SlotName::CustomerPhone => "What's the phone number on your loyalty account?",
    }
}

pub fn register_filters(tera: &mut Tera) {
    tera.register_filter("day", day_filter);
    tera.register_filter("clock", clock_filter);
    tera.register_filter("inr", inr_filter);
}

type FilterArgs = HashMap<String, tera::Value>;

/// `2026-10-20` -> `Tue 20 Oct`
fn day_filter(value: &tera::Value, _args: &FilterArgs) -> tera::Result<tera::Value> {
    let text = value.as_str().ok_or_else(|| tera::Error::msg("day filter expects a string"))?;
    Ok(match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        Ok(date) => tera::Value::String(date.format("%a %d %b").to_string()),
        Err(_) => value.clone(),
    })
}

/// `20:00` -> `8:00 PM`
fn clock_filter(value: &tera::Value, _args: &FilterArgs) -> tera::Result<tera::Value> {
    let text = value.as_str().ok_or_else(|| tera::Error::msg("clock filter expects a string"))?;
    Ok(match NaiveTime::parse_from_str(text, "%H:%M") {
        Ok(time) => tera::Value::String(time.format("%-I:%M %p").to_string()),
        Err(_) => value.clone(),
    })
}

/// `2400` -> `₹2,400`
fn inr_filter(value: &tera::Value, _args: &FilterArgs) -> tera::Result<tera::Value> {
    let amount =
        value.as_u64().ok_or_else(|| tera::Error::msg("inr filter expects a whole number"))?;
    let digits = amount.to_string();
    let mut grouped = String::new();
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    Ok(tera::Value::String(format!("₹{grouped}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use concierge_core::dialogue::{PromptReason, SlotChanges, SlotPrompt};
    use concierge_core::domain::intent::Intent;
    use concierge_core::domain::reservation::ReservationId;
    use concierge_core::domain::slot::{SlotMemory, SlotName, SlotValue};
    use concierge_core::errors::DialogueError;

    use super::ResponseComposer;
    use crate::executor::{ExecutionOutcome, ExecutionReport};
    use crate::tools::{DeclineReason, ToolErrorKind};

    fn composer() -> ResponseComposer {
        ResponseComposer::new().expect("templates compile")
    }

    fn report(intent: Intent, outcome: ExecutionOutcome) -> ExecutionReport {
        ExecutionReport { intent, tool: "test".to_string(), attempts: 1, outcome }
    }

    #[test]
    fn booking_confirmation_mentions_id_and_friendly_time() {
        let text = composer().execution(&report(
            Intent::Book,
            ExecutionOutcome::Completed {
                data: json!({
                    "reservation_id": "rsv-1a2b3c4d5e6f", "restaurant_name": "Karim's",
                    "date": "2026-10-20", "time": "20:00", "party_size": 4, "customer_name": null
                }),
            },
        ));

        assert_eq!(
            text,
            "Booked! Karim's, table for 4 on Tue 20 Oct at 8:00 PM. \
             Your reservation id is rsv-1a2b3c4d5e6f."
        );
    }

    #[test]
    fn discovery_lists_restaurants_with_prices() {
        let text = composer().execution(&report(
            Intent::Discover,
            ExecutionOutcome::Completed {
                data: json!({
                    "city": "Delhi", "cuisine": null, "party_size": 4, "date": null, "time": null,
                    "restaurants": [{
                        "id": "karims-delhi", "name": "Karim's", "cuisine": "Mughlai",
                        "neighborhood": "Jama Masjid", "price_label": "$$", "avg_price_inr": 1200,
                        "rating": 4.5, "veg_only": false, "seats_available": null, "fits": true
                    }]
                }),
            },
        ));

        assert!(text.starts_with("Top picks in Delhi, party of 4:"), "{text}");
        assert!(
            text.contains("1. Karim's (Mughlai, Jama Masjid) rated 4.5, about ₹1,200 for two"),
            "{text}"
        );
        assert!(text.ends_with("Want me to book one of these?"), "{text}");
    }

    #[test]
    fn capacity_decline_offers_alternatives() {
        let text = composer().execution(&report(
            Intent::Book,
            ExecutionOutcome::Declined {
                reason: DeclineReason::CapacityExceeded,
                invalidate: vec![SlotName::RestaurantId],
                data: json!({
                    "restaurant_id": "karims-delhi", "restaurant_name": "Karim's",
                    "date": "2026-10-20", "time": "20:00", "party_size": 6, "seats_available": 1,
                    "alternatives": [{
                        "id": "gulati-delhi", "name": "Gulati", "cuisine": "North Indian",
                        "rating": 4.4, "seats_available": 30
                    }]
                }),
            },
        ));

        assert!(text.starts_with("Sorry, Karim's only has 1 seat left"), "{text}");
        assert!(text.contains("- Gulati (North Indian, 30 seats free)"), "{text}");
        assert!(text.ends_with("Which restaurant would you like?"), "{text}");
    }

    #[test]
    fn not_found_wording_depends_on_intent() {
        let composer = composer();
        let declined = |intent, data| {
            composer.execution(&report(
                intent,
                ExecutionOutcome::Declined {
                    reason: DeclineReason::NotFound,
                    data,
                    invalidate: vec![],
                },
            ))
        };

        let cancel = declined(Intent::Cancel, json!({"reservation_id": "rsv-0000"}));
        assert!(cancel.contains("rsv-0000"));
        let loyalty = declined(Intent::LoyaltyInfo, json!({"phone": "9999999999"}));
        assert!(loyalty.contains("loyalty profile"));
    }

    #[test]
    fn slot_prompts_cover_every_reason() {
        let composer = composer();
        let prompt = |reason| {
            composer.slot_prompt(&SlotPrompt { intent: Intent::Book, slot: SlotName::Time, reason })
        };

        assert_eq!(prompt(PromptReason::Missing), "What time would you like?");
        assert_eq!(
            prompt(PromptReason::Ambiguous {
                candidates: vec!["08:00".to_string(), "20:00".to_string()],
            }),
            "Which time did you mean: 08:00, 20:00?"
        );
        let invalid = prompt(PromptReason::Invalid { reason: "too late".to_string() });
        assert!(invalid.starts_with("That time doesn't look right"));
    }

    #[test]
    fn cancel_confirmation_names_the_reservation() {
        let mut slots = SlotMemory::new();
        slots.insert(
            SlotName::ReservationId,
            SlotValue::Reservation(ReservationId("rsv-abcd1234".to_string())),
        );

        assert_eq!(
            composer().confirm(Intent::Cancel, &slots),
            "You want to cancel reservation rsv-abcd1234. Shall I go ahead? (yes/no)"
        );
    }

    #[test]
    fn failures_are_safe_and_overwrites_acknowledged() {
        let composer = composer();
        let text = composer.execution(&report(
            Intent::Book,
            ExecutionOutcome::Failed {
                error: DialogueError::ToolTimeout { tool: "book_table".to_string(), attempts: 1 },
                kind: ToolErrorKind::Timeout,
            },
        ));
        assert!(!text.contains("book_table"));
        assert!(text.contains("try again"));

        let mut slots = SlotMemory::new();
        slots.insert(SlotName::City, SlotValue::Text("Kolkata".to_string()));
        let changes = SlotChanges { overwritten: vec![SlotName::City], ..SlotChanges::default() };
        assert_eq!(
            composer.acknowledge(&changes, &slots).as_deref(),
            Some("Got it, changed city to Kolkata.")
        );
    }
}
