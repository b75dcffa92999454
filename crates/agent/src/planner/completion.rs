use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use concierge_core::domain::intent::Intent;
use concierge_core::domain::plan::{AmbiguousSlot, PlanRequest, PlannerOutput};
use concierge_core::domain::slot::{InvalidSlotValue, SlotKind, SlotName, SlotValue};
use concierge_core::schema::SchemaRegistry;

use super::directory::RestaurantDirectory;
use super::rules::{date_from_phrase, time_from_phrase};
use super::{complete_missing, IntentGuard, Planner, PlannerError};
use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::prompts::{PromptError, PromptRenderer};

const DEFAULT_HISTORY_WINDOW: usize = 20;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_TOKENS: u32 = 512;
const DEFAULT_CONFIDENCE: f32 = 0.5;

/// What the completion capability is asked to return. Everything is optional
/// so a partially filled reply still yields a usable plan.
#[derive(Debug, Default, Deserialize)]
struct RawPlan {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    slots: BTreeMap<String, Value>,
    #[serde(default)]
    ambiguous: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    confirmation: Option<bool>,
}

/// Planner backed by an [`LlmClient`]. Output is parsed and type-checked
/// before it reaches the session; the model never writes slots directly.
pub struct CompletionPlanner<C> {
    client: C,
    prompts: PromptRenderer,
    schema: SchemaRegistry,
    directory: RestaurantDirectory,
    guard: IntentGuard,
    history_window: usize,
    timeout: Duration,
    max_tokens: u32,
}

impl<C: LlmClient> CompletionPlanner<C> {
    pub fn new(
        client: C,
        schema: SchemaRegistry,
        directory: RestaurantDirectory,
        guard: IntentGuard,
    ) -> Result<Self, PromptError> {
        Ok(Self {
            client,
            prompts: PromptRenderer::new()?,
            schema,
            directory,
            guard,
            history_window: DEFAULT_HISTORY_WINDOW,
            timeout: DEFAULT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn interpret(&self, raw: RawPlan, request: &PlanRequest<'_>) -> PlannerOutput {
        let intent = raw.intent.as_deref().and_then(Intent::parse).unwrap_or(Intent::Unknown);
        let confidence = if intent == Intent::Unknown {
            0.0
        } else {
            raw.confidence.unwrap_or(DEFAULT_CONFIDENCE)
        };
        let mut output = PlannerOutput::new(intent, confidence);
        output.confirmation = raw.confirmation.filter(|_| request.awaiting_confirmation);

        for (name, value) in raw.slots {
            let Some(slot) = SlotName::parse(&name) else {
                debug!(
                    event_name = "planner.completion.unknown_slot",
                    slot = %name,
                    "ignoring slot"
                );
                continue;
            };
            if value.is_null() {
                continue;
            }
            match self.coerce(slot, &value, request) {
                Ok(SlotReading::Value(value)) => {
                    output.slot_updates.insert(slot, value);
                }
                Ok(SlotReading::Ambiguous(candidates)) => {
                    output.ambiguous_slots.push(AmbiguousSlot { slot, candidates });
                }
                Err(rejected) => output.rejected_slots.push(rejected),
            }
        }

        for (name, candidates) in raw.ambiguous {
            let Some(slot) = SlotName::parse(&name) else {
                continue;
            };
            if output.slot_updates.contains_key(&slot) || output.ambiguity_for(slot).is_some() {
                continue;
            }
            let candidates = candidates
                .iter()
                .map(|candidate| match candidate {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>();
            if candidates.len() > 1 {
                output.ambiguous_slots.push(AmbiguousSlot { slot, candidates });
            }
        }

        output
    }

    fn coerce(
        &self,
        slot: SlotName,
        value: &Value,
        request: &PlanRequest<'_>,
    ) -> Result<SlotReading, InvalidSlotValue> {
        let text = value.as_str().unwrap_or_default();
        match slot.kind() {
            SlotKind::Restaurant if !self.directory.is_empty() => {
                let ids = self.directory.resolve_restaurant(text);
                match ids.as_slice() {
                    [id] => Ok(SlotReading::Value(SlotValue::Restaurant(id.clone()))),
                    [] => Err(InvalidSlotValue {
                        slot,
                        reason: format!("{text} is not a restaurant we can book"),
                    }),
                    many => Ok(SlotReading::Ambiguous(
                        many.iter()
                            .map(|id| self.directory.display_name(id).unwrap_or(&id.0).to_string())
                            .collect(),
                    )),
                }
            }
            _ => match slot.coerce(value) {
                Ok(SlotValue::Text(text)) if slot == SlotName::City => {
                    let city = self.directory.canonical_city(&text).map(str::to_string);
                    Ok(SlotReading::Value(SlotValue::Text(city.unwrap_or(text))))
                }
                Ok(coerced) => Ok(SlotReading::Value(coerced)),
                Err(error) => match slot.kind() {
                    SlotKind::Date => date_from_phrase(text, request.today)
                        .map(|date| SlotReading::Value(SlotValue::Date(date)))
                        .ok_or(error),
                    SlotKind::Time => time_from_phrase(text)
                        .map(|time| SlotReading::Value(SlotValue::Time(time)))
                        .ok_or(error),
                    _ => Err(error),
                },
            },
        }
    }
}

enum SlotReading {
    Value(SlotValue),
    Ambiguous(Vec<String>),
}

#[async_trait]
impl<C: LlmClient> Planner for CompletionPlanner<C> {
    fn name(&self) -> &'static str {
        "completion"
    }

    async fn plan(&self, request: &PlanRequest<'_>) -> Result<PlannerOutput, PlannerError> {
        let unavailable = |reason: String| {
            warn!(
                event_name = "planner.completion.unavailable",
                reason = %reason,
                "planner unavailable"
            );
            PlannerError::Unavailable { reason }
        };

        let start = request.history.len().saturating_sub(self.history_window);
        let system = self
            .prompts
            .planner_system(&self.schema, &self.directory)
            .map_err(|error| unavailable(error.to_string()))?;
        let turn = self
            .prompts
            .planner_turn(request, &request.history[start..])
            .map_err(|error| unavailable(error.to_string()))?;

        let completion = CompletionRequest {
            messages: vec![ChatMessage::system(system), ChatMessage::user(turn)],
            max_tokens: self.max_tokens,
            temperature: 0.0,
        };
        let reply = tokio::time::timeout(self.timeout, self.client.complete(completion)).await;
        let reply = match reply {
            Ok(Ok(reply)) => reply,
            Ok(Err(error)) => return Err(unavailable(format!("{error:#}"))),
            Err(_) => {
                return Err(unavailable(format!(
                    "no completion within {}ms",
                    self.timeout.as_millis()
                )))
            }
        };

        let json = extract_json(&reply)
            .ok_or_else(|| unavailable("completion reply contained no JSON object".to_string()))?;
        let raw: RawPlan = serde_json::from_str(json)
            .map_err(|error| unavailable(format!("completion reply was not a plan: {error}")))?;

        let output = self.interpret(raw, request);
        debug!(
            event_name = "planner.completion.parsed",
            intent = %output.intent,
            confidence = output.confidence,
            slots = output.slot_updates.len(),
            "completion plan parsed"
        );
        let output = self.guard.apply(request.current_intent, output);
        Ok(complete_missing(&self.schema, request, output))
    }
}

/// Pulls the JSON object out of a reply that may wrap it in a fenced block or prose.
fn extract_json(reply: &str) -> Option<&str> {
    let trimmed = reply.trim();
    for fence in ["```json", "```JSON", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let body = &trimmed[start + fence.len()..];
            if let Some(end) = body.find("```") {
                let candidate = body[..end].trim();
                if candidate.starts_with('{') {
                    return Some(candidate);
                }
            }
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (start < end).then(|| &trimmed[start..=end])
}
