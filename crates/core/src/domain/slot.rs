use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::reservation::ReservationId;
use crate::domain::restaurant::RestaurantId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    City,
    PartySize,
    Date,
    Time,
    RestaurantId,
    Cuisine,
    ReservationId,
    CustomerName,
    CustomerPhone,
}

/// How long a filled slot survives an intent change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotScope {
    /// Kept as a default for every later intent in the session.
    Conversation,
    /// Kept only when the next intent declares the slot.
    Intent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Text,
    Count,
    Date,
    Time,
    Restaurant,
    Reservation,
    Phone,
}

impl SlotName {
    pub const ALL: [SlotName; 9] = [
        Self::City,
        Self::PartySize,
        Self::Date,
        Self::Time,
        Self::RestaurantId,
        Self::Cuisine,
        Self::ReservationId,
        Self::CustomerName,
        Self::CustomerPhone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::City => "city",
            Self::PartySize => "party_size",
            Self::Date => "date",
            Self::Time => "time",
            Self::RestaurantId => "restaurant_id",
            Self::Cuisine => "cuisine",
            Self::ReservationId => "reservation_id",
            Self::CustomerName => "customer_name",
            Self::CustomerPhone => "customer_phone",
        }
    }

    /// Human-facing name used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::City => "city",
            Self::PartySize => "party size",
            Self::Date => "date",
            Self::Time => "time",
            Self::RestaurantId => "restaurant",
            Self::Cuisine => "cuisine",
            Self::ReservationId => "reservation id",
            Self::CustomerName => "name",
            Self::CustomerPhone => "phone number",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|slot| slot.as_str() == normalized)
    }

    pub fn scope(&self) -> SlotScope {
        match self {
            Self::RestaurantId | Self::Cuisine | Self::ReservationId => SlotScope::Intent,
            Self::City
            | Self::PartySize
            | Self::Date
            | Self::Time
            | Self::CustomerName
            | Self::CustomerPhone => SlotScope::Conversation,
        }
    }

    pub fn kind(&self) -> SlotKind {
        match self {
            Self::City | Self::Cuisine | Self::CustomerName => SlotKind::Text,
            Self::PartySize => SlotKind::Count,
            Self::Date => SlotKind::Date,
            Self::Time => SlotKind::Time,
            Self::RestaurantId => SlotKind::Restaurant,
            Self::ReservationId => SlotKind::Reservation,
            Self::CustomerPhone => SlotKind::Phone,
        }
    }

    /// Coerces a loosely-typed value (planner JSON) into this slot's type.
    ///
    /// Only shape is checked here; range rules live in the schema registry.
    pub fn coerce(&self, raw: &Value) -> Result<SlotValue, InvalidSlotValue> {
        let invalid = |reason: &str| InvalidSlotValue { slot: *self, reason: reason.to_string() };

        let text = match raw {
            Value::String(text) => text.trim().to_string(),
            Value::Number(number) => number.to_string(),
            Value::Null => return Err(invalid("value is empty")),
            _ => return Err(invalid("expected a string or number")),
        };
        if text.is_empty() {
            return Err(invalid("value is empty"));
        }

        match self.kind() {
            SlotKind::Text => Ok(SlotValue::Text(text)),
            SlotKind::Count => match raw {
                Value::Number(number) => number
                    .as_i64()
                    .ok_or_else(|| invalid("expected a whole number"))
                    .and_then(|value| {
                        u32::try_from(value).map_err(|_| invalid("must be a positive number"))
                    })
                    .map(SlotValue::Count),
                _ => text
                    .parse::<i64>()
                    .map_err(|_| invalid("expected a whole number"))
                    .and_then(|value| {
                        u32::try_from(value).map_err(|_| invalid("must be a positive number"))
                    })
                    .map(SlotValue::Count),
            },
            SlotKind::Date => parse_date(&text).map(SlotValue::Date).ok_or_else(|| {
                invalid("expected a calendar date (YYYY-MM-DD)")
            }),
            SlotKind::Time => parse_time(&text)
                .map(SlotValue::Time)
                .ok_or_else(|| invalid("expected a time of day (HH:MM)")),
            SlotKind::Restaurant => Ok(SlotValue::Restaurant(RestaurantId(text.to_lowercase()))),
            SlotKind::Reservation => {
                Ok(SlotValue::Reservation(ReservationId(text.to_lowercase())))
            }
            SlotKind::Phone => normalize_phone(&text)
                .map(SlotValue::Phone)
                .ok_or_else(|| invalid("expected a 10 to 13 digit phone number")),
        }
    }
}

impl std::fmt::Display for SlotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SlotValue {
    Text(String),
    Count(u32),
    Date(NaiveDate),
    Time(NaiveTime),
    Restaurant(RestaurantId),
    Reservation(ReservationId),
    Phone(String),
}

impl SlotValue {
    pub fn kind(&self) -> SlotKind {
        match self {
            Self::Text(_) => SlotKind::Text,
            Self::Count(_) => SlotKind::Count,
            Self::Date(_) => SlotKind::Date,
            Self::Time(_) => SlotKind::Time,
            Self::Restaurant(_) => SlotKind::Restaurant,
            Self::Reservation(_) => SlotKind::Reservation,
            Self::Phone(_) => SlotKind::Phone,
        }
    }

    /// Wire form used when the value becomes a tool argument.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) | Self::Phone(text) => Value::String(text.clone()),
            Self::Count(count) => Value::from(*count),
            Self::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            Self::Time(time) => Value::String(time.format("%H:%M").to_string()),
            Self::Restaurant(id) => Value::String(id.0.clone()),
            Self::Reservation(id) => Value::String(id.0.clone()),
        }
    }
}

impl std::fmt::Display for SlotValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) | Self::Phone(text) => f.write_str(text),
            Self::Count(count) => write!(f, "{count}"),
            Self::Date(date) => write!(f, "{}", date.format("%a %d %b %Y")),
            Self::Time(time) => write!(f, "{}", time.format("%H:%M")),
            Self::Restaurant(id) => f.write_str(&id.0),
            Self::Reservation(id) => f.write_str(&id.0),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("invalid value for `{slot}`: {reason}")]
pub struct InvalidSlotValue {
    pub slot: SlotName,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMemory {
    values: BTreeMap<SlotName, SlotValue>,
}

impl SlotMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: SlotName) -> Option<&SlotValue> {
        self.values.get(&slot)
    }

    pub fn contains(&self, slot: SlotName) -> bool {
        self.values.contains_key(&slot)
    }

    /// Stores `value`, returning whatever the slot held before.
    pub fn insert(&mut self, slot: SlotName, value: SlotValue) -> Option<SlotValue> {
        self.values.insert(slot, value)
    }

    pub fn remove(&mut self, slot: SlotName) -> Option<SlotValue> {
        self.values.remove(&slot)
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(SlotName, &SlotValue) -> bool,
    {
        self.values.retain(|slot, value| keep(*slot, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotName, &SlotValue)> {
        self.values.iter().map(|(slot, value)| (*slot, value))
    }

    pub fn names(&self) -> Vec<SlotName> {
        self.values.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn text(&self, slot: SlotName) -> Option<&str> {
        match self.values.get(&slot) {
            Some(SlotValue::Text(text)) | Some(SlotValue::Phone(text)) => Some(text),
            _ => None,
        }
    }

    pub fn count(&self, slot: SlotName) -> Option<u32> {
        match self.values.get(&slot) {
            Some(SlotValue::Count(count)) => Some(*count),
            _ => None,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self.values.get(&SlotName::Date) {
            Some(SlotValue::Date(date)) => Some(*date),
            _ => None,
        }
    }

    pub fn time(&self) -> Option<NaiveTime> {
        match self.values.get(&SlotName::Time) {
            Some(SlotValue::Time(time)) => Some(*time),
            _ => None,
        }
    }

    pub fn restaurant_id(&self) -> Option<&RestaurantId> {
        match self.values.get(&SlotName::RestaurantId) {
            Some(SlotValue::Restaurant(id)) => Some(id),
            _ => None,
        }
    }

    pub fn reservation_id(&self) -> Option<&ReservationId> {
        match self.values.get(&SlotName::ReservationId) {
            Some(SlotValue::Reservation(id)) => Some(id),
            _ => None,
        }
    }
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let compact = text.trim().to_ascii_uppercase().replace('.', ":").replace(' ', "");
    let stripped = compact.strip_suffix("AM").or_else(|| compact.strip_suffix("PM"));
    let (clock, meridiem) = match stripped {
        Some(clock) => (clock, Some(&compact[clock.len()..])),
        None => (compact.as_str(), None),
    };
    // chrono needs a minute field, so "8pm" becomes "8:00 PM".
    let clock = if clock.contains(':') { clock.to_string() } else { format!("{clock}:00") };
    match meridiem {
        Some(meridiem) => {
            NaiveTime::parse_from_str(&format!("{clock} {meridiem}"), "%I:%M %p").ok()
        }
        None => ["%H:%M", "%H:%M:%S"]
            .iter()
            .find_map(|format| NaiveTime::parse_from_str(&clock, format).ok()),
    }
}

/// Keeps digits (and a leading `+`), accepting 10 to 13 digit numbers.
pub fn normalize_phone(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let digits = trimmed.chars().filter(char::is_ascii_digit).collect::<String>();
    let only_phone_chars =
        trimmed.chars().all(|ch| ch.is_ascii_digit() || matches!(ch, '+' | '-' | ' ' | '(' | ')'));
    if !only_phone_chars || !(10..=13).contains(&digits.len()) {
        return None;
    }
    if trimmed.starts_with('+') {
        Some(format!("+{digits}"))
    } else {
        Some(digits)
    }
}
