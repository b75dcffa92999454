//! Planner prompt rendering.
//!
//! Templates are compiled into the binary from `templates/prompts/` and
//! rendered with Tera; the planner never builds prompt text by hand.

use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};
use thiserror::Error;

use concierge_core::domain::plan::PlanRequest;
use concierge_core::domain::session::Turn;
use concierge_core::schema::SchemaRegistry;

use crate::planner::RestaurantDirectory;

const PLANNER_SYSTEM: &str = "planner_system.txt";
const PLANNER_TURN: &str = "planner_turn.txt";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Serialize)]
struct SchemaView {
    intent: &'static str,
    required: Vec<&'static str>,
    optional: Vec<&'static str>,
    confirmation: bool,
}

#[derive(Serialize)]
struct RestaurantView<'a> {
    id: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct SlotView {
    name: &'static str,
    value: String,
}

#[derive(Serialize)]
struct TurnView<'a> {
    user: &'a str,
    agent: &'a str,
}

#[derive(Clone, Debug)]
pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            PLANNER_SYSTEM,
            include_str!("../../../templates/prompts/planner_system.txt.tera"),
        )?;
        tera.add_raw_template(
            PLANNER_TURN,
            include_str!("../../../templates/prompts/planner_turn.txt.tera"),
        )?;
        Ok(Self { tera })
    }

    /// Static instructions: intent schemas, slot formats and the known vocabulary.
    pub fn planner_system(
        &self,
        schema: &SchemaRegistry,
        directory: &RestaurantDirectory,
    ) -> Result<String, PromptError> {
        let schemas = schema
            .schemas()
            .map(|entry| SchemaView {
                intent: entry.intent.as_str(),
                required: entry.required.iter().map(|slot| slot.as_str()).collect(),
                optional: entry.optional.iter().map(|slot| slot.as_str()).collect(),
                confirmation: entry.requires_confirmation,
            })
            .collect::<Vec<_>>();
        let restaurants = directory
            .restaurants()
            .map(|(id, name)| RestaurantView { id: &id.0, name })
            .collect::<Vec<_>>();

        let mut context = Context::new();
        context.insert("schemas", &schemas);
        context.insert("restaurants", &restaurants);
        context.insert("cities", &directory.cities().collect::<Vec<_>>());
        context.insert("cuisines", &directory.cuisines().collect::<Vec<_>>());
        Ok(self.tera.render(PLANNER_SYSTEM, &context)?)
    }

    /// Per-turn context: today, the active intent, known slots, recent turns and the utterance.
    pub fn planner_turn(
        &self,
        request: &PlanRequest<'_>,
        history: &[Turn],
    ) -> Result<String, PromptError> {
        let slots = request
            .current_slots
            .iter()
            .map(|(slot, value)| SlotView {
                name: slot.as_str(),
                value: match value.to_json() {
                    Value::String(text) => text,
                    other => other.to_string(),
                },
            })
            .collect::<Vec<_>>();
        let history = history
            .iter()
            .map(|turn| TurnView { user: &turn.user_text, agent: &turn.agent_text })
            .collect::<Vec<_>>();

        let mut context = Context::new();
        context.insert("today", &request.today.format("%Y-%m-%d (%A)").to_string());
        context.insert(
            "current_intent",
            request.current_intent.map(|intent| intent.as_str()).unwrap_or("none"),
        );
        context.insert("awaiting_confirmation", &request.awaiting_confirmation);
        context.insert("slots", &slots);
        context.insert("history", &history);
        context.insert("utterance", request.canonical_text);
        Ok(self.tera.render(PLANNER_TURN, &context)?)
    }
}
