use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::intent::Intent;
use crate::domain::slot::{InvalidSlotValue, SlotMemory, SlotName, SlotValue};

pub const DEFAULT_MAX_PARTY_SIZE: u32 = 20;

/// Slot contract of one intent. `required` is in prompt order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentSchema {
    pub intent: Intent,
    pub required: Vec<SlotName>,
    pub optional: Vec<SlotName>,
    pub requires_confirmation: bool,
}

impl IntentSchema {
    fn new(intent: Intent, required: &[SlotName], optional: &[SlotName]) -> Self {
        Self {
            intent,
            required: required.to_vec(),
            optional: optional.to_vec(),
            requires_confirmation: false,
        }
    }

    fn confirmed(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn declares(&self, slot: SlotName) -> bool {
        self.required.contains(&slot) || self.optional.contains(&slot)
    }

    pub fn missing(&self, slots: &SlotMemory) -> Vec<SlotName> {
        self.required.iter().copied().filter(|slot| !slots.contains(*slot)).collect()
    }
}

#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    schemas: BTreeMap<Intent, IntentSchema>,
    max_party_size: u32,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARTY_SIZE)
    }
}

impl SchemaRegistry {
    pub fn new(max_party_size: u32) -> Self {
        use SlotName::*;

        let schemas = [
            IntentSchema::new(Intent::Discover, &[City, PartySize], &[Cuisine, Date, Time]),
            IntentSchema::new(
                Intent::CheckAvailability,
                &[RestaurantId, Date, Time],
                &[PartySize, City],
            ),
            IntentSchema::new(
                Intent::Book,
                &[RestaurantId, PartySize, Date, Time],
                &[City, CustomerName],
            ),
            IntentSchema::new(Intent::Cancel, &[ReservationId], &[]).confirmed(),
            IntentSchema::new(Intent::LoyaltyInfo, &[CustomerPhone], &[CustomerName]),
            IntentSchema::new(Intent::Smalltalk, &[], &[]),
            IntentSchema::new(Intent::Unknown, &[], &[]),
        ]
        .into_iter()
        .map(|schema| (schema.intent, schema))
        .collect();

        Self { schemas, max_party_size }
    }

    pub fn max_party_size(&self) -> u32 {
        self.max_party_size
    }

    pub fn get(&self, intent: Intent) -> Option<&IntentSchema> {
        self.schemas.get(&intent)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &IntentSchema> {
        self.schemas.values()
    }

    pub fn declares(&self, intent: Intent, slot: SlotName) -> bool {
        self.get(intent).is_some_and(|schema| schema.declares(slot))
    }

    pub fn requires_confirmation(&self, intent: Intent) -> bool {
        self.get(intent).is_some_and(|schema| schema.requires_confirmation)
    }

    pub fn missing(&self, intent: Intent, slots: &SlotMemory) -> Vec<SlotName> {
        self.get(intent).map(|schema| schema.missing(slots)).unwrap_or_default()
    }

    /// Range rules that need configuration or the current date.
    pub fn validate(
        &self,
        slot: SlotName,
        value: &SlotValue,
        today: NaiveDate,
    ) -> Result<(), InvalidSlotValue> {
        let invalid = |reason: String| Err(InvalidSlotValue { slot, reason });

        if value.kind() != slot.kind() {
            return invalid(format!("expected a {:?} value", slot.kind()).to_lowercase());
        }

        match value {
            SlotValue::Count(0) => invalid("party size must be at least 1".to_string()),
            SlotValue::Count(count) if *count > self.max_party_size => invalid(format!(
                "we can seat at most {} guests per booking",
                self.max_party_size
            )),
            SlotValue::Date(date) if *date < today => {
                invalid(format!("{} is in the past", date.format("%d %b %Y")))
            }
            SlotValue::Text(text) if text.trim().is_empty() => {
                invalid("value is empty".to_string())
            }
            SlotValue::Restaurant(id) if id.0.trim().is_empty() => {
                invalid("value is empty".to_string())
            }
            SlotValue::Reservation(id) if id.0.trim().is_empty() => {
                invalid("value is empty".to_string())
            }
            SlotValue::Phone(phone) if !is_phone_number(phone) => {
                invalid("expected a 10 to 13 digit phone number".to_string())
            }
            _ => Ok(()),
        }
    }
}

fn is_phone_number(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    (10..=13).contains(&digits.len()) && digits.chars().all(|ch| ch.is_ascii_digit())
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DependencyTableError {
    #[error("unknown slot `{0}` in slot dependency table")]
    UnknownSlot(String),
    #[error("slot `{0}` cannot depend on itself")]
    SelfDependency(String),
}

/// Which slots become stale when another slot changes value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotDependencyTable {
    edges: BTreeMap<SlotName, BTreeSet<SlotName>>,
}

impl Default for SlotDependencyTable {
    fn default() -> Self {
        let mut edges = BTreeMap::new();
        edges.insert(SlotName::City, BTreeSet::from([SlotName::RestaurantId]));
        Self { edges }
    }
}

impl SlotDependencyTable {
    pub fn empty() -> Self {
        Self { edges: BTreeMap::new() }
    }

    /// Builds the table from configuration. An empty map keeps the default edges.
    pub fn from_config(raw: &BTreeMap<String, Vec<String>>) -> Result<Self, DependencyTableError> {
        if raw.is_empty() {
            return Ok(Self::default());
        }

        let parse = |name: &str| {
            SlotName::parse(name).ok_or_else(|| DependencyTableError::UnknownSlot(name.to_string()))
        };

        let mut edges = BTreeMap::new();
        for (source, targets) in raw {
            let source_slot = parse(source)?;
            let mut dependents = BTreeSet::new();
            for target in targets {
                let target_slot = parse(target)?;
                if target_slot == source_slot {
                    return Err(DependencyTableError::SelfDependency(source.clone()));
                }
                dependents.insert(target_slot);
            }
            edges.insert(source_slot, dependents);
        }
        Ok(Self { edges })
    }

    pub fn with_edge(mut self, source: SlotName, dependent: SlotName) -> Self {
        self.edges.entry(source).or_default().insert(dependent);
        self
    }

    /// Every slot reachable from `slot`, excluding `slot` itself.
    pub fn dependents_of(&self, slot: SlotName) -> Vec<SlotName> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([slot]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.edges.get(&current).into_iter().flatten() {
                if *dependent != slot && seen.insert(*dependent) {
                    queue.push_back(*dependent);
                }
            }
        }

        seen.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::{DependencyTableError, SchemaRegistry, SlotDependencyTable};
    use crate::domain::intent::Intent;
    use crate::domain::restaurant::RestaurantId;
    use crate::domain::slot::{SlotMemory, SlotName, SlotValue};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    #[test]
    fn missing_slots_follow_priority_order() {
        let registry = SchemaRegistry::default();
        let mut slots = SlotMemory::new();
        slots.insert(SlotName::PartySize, SlotValue::Count(4));

        assert_eq!(
            registry.missing(Intent::Book, &slots),
            vec![SlotName::RestaurantId, SlotName::Date, SlotName::Time]
        );
        assert_eq!(registry.missing(Intent::Discover, &slots), vec![SlotName::City]);
        assert!(registry.missing(Intent::Smalltalk, &slots).is_empty());
    }

    #[test]
    fn only_cancel_requires_confirmation() {
        let registry = SchemaRegistry::default();
        let confirmed: Vec<Intent> = registry
            .schemas()
            .filter(|schema| schema.requires_confirmation)
            .map(|schema| schema.intent)
            .collect();
        assert_eq!(confirmed, vec![Intent::Cancel]);
    }

    #[test]
    fn validation_enforces_ranges() {
        let registry = SchemaRegistry::new(8);

        assert!(registry.validate(SlotName::PartySize, &SlotValue::Count(8), today()).is_ok());
        let too_many = registry
            .validate(SlotName::PartySize, &SlotValue::Count(9), today())
            .expect_err("over max");
        assert!(too_many.reason.contains("at most 8"));
        assert!(registry.validate(SlotName::PartySize, &SlotValue::Count(0), today()).is_err());

        let yesterday = today().pred_opt().expect("previous day");
        assert!(registry.validate(SlotName::Date, &SlotValue::Date(yesterday), today()).is_err());
        assert!(registry.validate(SlotName::Date, &SlotValue::Date(today()), today()).is_ok());

        assert!(registry
            .validate(SlotName::CustomerPhone, &SlotValue::Phone("98200".to_string()), today())
            .is_err());
        assert!(registry
            .validate(SlotName::City, &SlotValue::Count(3), today())
            .is_err());
        assert!(registry
            .validate(
                SlotName::RestaurantId,
                &SlotValue::Restaurant(RestaurantId("karims-delhi".to_string())),
                today()
            )
            .is_ok());
    }

    #[test]
    fn default_dependencies_invalidate_restaurant_on_city_change() {
        let table = SlotDependencyTable::default();
        assert_eq!(table.dependents_of(SlotName::City), vec![SlotName::RestaurantId]);
        assert!(table.dependents_of(SlotName::RestaurantId).is_empty());
        assert!(table.dependents_of(SlotName::Date).is_empty());
    }

    #[test]
    fn dependencies_are_transitive_and_cycle_safe() {
        let table = SlotDependencyTable::empty()
            .with_edge(SlotName::City, SlotName::RestaurantId)
            .with_edge(SlotName::RestaurantId, SlotName::ReservationId)
            .with_edge(SlotName::ReservationId, SlotName::City);

        assert_eq!(
            table.dependents_of(SlotName::City),
            vec![SlotName::RestaurantId, SlotName::ReservationId]
        );
    }

    #[test]
    fn configured_dependencies_reject_unknown_slots() {
        let mut raw = BTreeMap::new();
        raw.insert("city".to_string(), vec!["restaurant_id".to_string(), "time".to_string()]);
        let table = SlotDependencyTable::from_config(&raw).expect("valid table");
        assert_eq!(
            table.dependents_of(SlotName::City),
            vec![SlotName::Time, SlotName::RestaurantId]
        );

        raw.insert("galaxy".to_string(), vec!["city".to_string()]);
        assert_eq!(
            SlotDependencyTable::from_config(&raw),
            Err(DependencyTableError::UnknownSlot("galaxy".to_string()))
        );
        assert_eq!(
            SlotDependencyTable::from_config(&BTreeMap::new()),
            Ok(SlotDependencyTable::default())
        );
    }
}
