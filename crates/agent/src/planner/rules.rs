use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};

use concierge_core::domain::intent::Intent;
use concierge_core::domain::plan::{AmbiguousSlot, PlanRequest, PlannerOutput};
use concierge_core::domain::reservation::ReservationId;
use concierge_core::domain::slot::{
    normalize_phone, parse_date, InvalidSlotValue, SlotName, SlotValue,
};
use concierge_core::schema::SchemaRegistry;

use super::directory::RestaurantDirectory;
use super::{complete_missing, IntentGuard, Planner, PlannerError};
use crate::normalizer::normalize;

const PEOPLE_WORDS: &[&str] = &[
    "people", "person", "persons", "guests", "guest", "adults", "pax", "diners", "members",
    "seats", "heads",
];
const TIME_SUFFIXES: &[&str] = &["am", "pm", "oclock", "hrs", "hours"];
const PM_HINTS: &[&str] = &["evening", "night", "tonight", "dinner", "afternoon", "lunch"];
const AM_HINTS: &[&str] = &["morning", "breakfast"];
const NAME_STOPWORDS: &[&str] = &[
    "for", "at", "on", "in", "and", "the", "to", "with", "a", "table", "people", "today",
    "tomorrow", "tonight", "is", "my", "please", "book", "reserve", "of",
];
const YES_WORDS: &[&str] = &[
    "yes", "yeah", "yep", "yup", "sure", "ok", "okay", "confirm", "confirmed", "correct", "proceed",
    "retry",
];
const NO_WORDS: &[&str] = &["no", "nope", "dont", "stop", "abort", "nevermind", "never", "keep"];

const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("fifteen", 15),
    ("twenty", 20),
];

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("mon", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("tue", Weekday::Tue),
    ("tues", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("wed", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("thu", Weekday::Thu),
    ("thurs", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("fri", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sat", Weekday::Sat),
    ("sunday", Weekday::Sun),
    ("sun", Weekday::Sun),
];

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("jan", 1),
    ("february", 2),
    ("feb", 2),
    ("march", 3),
    ("mar", 3),
    ("april", 4),
    ("apr", 4),
    ("may", 5),
    ("june", 6),
    ("jun", 6),
    ("july", 7),
    ("jul", 7),
    ("august", 8),
    ("aug", 8),
    ("september", 9),
    ("sep", 9),
    ("sept", 9),
    ("october", 10),
    ("oct", 10),
    ("november", 11),
    ("nov", 11),
    ("december", 12),
    ("dec", 12),
];

/// Structured view of one utterance before session context is applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    pub intent: Intent,
    pub confidence: f32,
    pub slots: BTreeMap<SlotName, SlotValue>,
    pub ambiguous: Vec<AmbiguousSlot>,
    pub rejected: Vec<InvalidSlotValue>,
    pub confirmation: Option<bool>,
}

/// Deterministic keyword and pattern planner over canonical text.
pub struct RulePlanner {
    directory: RestaurantDirectory,
    schema: SchemaRegistry,
    guard: IntentGuard,
}

impl RulePlanner {
    pub fn new(directory: RestaurantDirectory, schema: SchemaRegistry, guard: IntentGuard) -> Self {
        Self { directory, schema, guard }
    }

    pub fn extract(&self, text: &str, today: NaiveDate, awaiting_confirmation: bool) -> Extraction {
        let all_tokens = text.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        let mut masked = text.to_string();
        let mut extraction = Extraction {
            intent: Intent::Unknown,
            confidence: 0.0,
            slots: BTreeMap::new(),
            ambiguous: Vec::new(),
            rejected: Vec::new(),
            confirmation: None,
        };

        let restaurants = self.directory.find_restaurants(text);
        mask_spans(&mut masked, restaurants.iter().map(|hit| (hit.start, hit.end)));
        let mut restaurant_ids = restaurants.into_iter().map(|hit| hit.value).collect::<Vec<_>>();
        restaurant_ids.dedup();
        match restaurant_ids.as_slice() {
            [] => {}
            [id] => {
                extraction.slots.insert(SlotName::RestaurantId, SlotValue::Restaurant(id.clone()));
            }
            ids => extraction.ambiguous.push(AmbiguousSlot {
                slot: SlotName::RestaurantId,
                candidates: ids
                    .iter()
                    .map(|id| self.directory.display_name(id).unwrap_or(&id.0).to_string())
                    .collect(),
            }),
        }

        let cuisines = self.directory.find_cuisines(&masked);
        mask_spans(&mut masked, cuisines.iter().map(|hit| (hit.start, hit.end)));
        record_text(
            &mut extraction,
            SlotName::Cuisine,
            cuisines.into_iter().map(|hit| hit.value).collect(),
        );

        let cities = self.directory.find_cities(&masked);
        mask_spans(&mut masked, cities.iter().map(|hit| (hit.start, hit.end)));
        let cities = cities.into_iter().map(|hit| hit.value).collect();
        record_text(&mut extraction, SlotName::City, cities);

        let mut tokens = masked.split_whitespace().map(str::to_string).collect::<Vec<_>>();

        let reservation_ids = extract_reservation_ids(&mut tokens);
        record(
            &mut extraction,
            SlotName::ReservationId,
            reservation_ids,
            |id| SlotValue::Reservation(ReservationId(id.clone())),
            |id| id.clone(),
        );

        match extract_phone(&mut tokens) {
            Some(Ok(phone)) => {
                extraction.slots.insert(SlotName::CustomerPhone, SlotValue::Phone(phone));
            }
            Some(Err(rejected)) => extraction.rejected.push(rejected),
            None => {}
        }

        let dates = extract_dates(&mut tokens, today);
        record(
            &mut extraction,
            SlotName::Date,
            dates,
            |date| SlotValue::Date(*date),
            |date| date.format("%Y-%m-%d").to_string(),
        );

        let hint = meridiem_hint(&all_tokens);
        match extract_times(&mut tokens, hint) {
            TimeMentions::None => {}
            TimeMentions::Exact(times) => {
                record(
                    &mut extraction,
                    SlotName::Time,
                    times,
                    |time| SlotValue::Time(*time),
                    |time| time.format("%H:%M").to_string(),
                )
            }
            TimeMentions::Ambiguous(candidates) => extraction.ambiguous.push(AmbiguousSlot {
                slot: SlotName::Time,
                candidates: candidates
                    .iter()
                    .map(|time| time.format("%H:%M").to_string())
                    .collect(),
            }),
        }

        let party_sizes = extract_party_sizes(&mut tokens);
        record(
            &mut extraction,
            SlotName::PartySize,
            party_sizes,
            |count| SlotValue::Count(*count),
            |count| count.to_string(),
        );

        if let Some(name) = extract_customer_name(&tokens) {
            extraction.slots.insert(SlotName::CustomerName, SlotValue::Text(name));
        }

        let (intent, confidence) = classify_intent(&self.schema, &all_tokens, &extraction.slots);
        extraction.intent = intent;
        extraction.confidence = confidence;

        if awaiting_confirmation {
            extraction.confirmation = extract_confirmation(&all_tokens);
        }

        extraction
    }
}

#[async_trait]
impl Planner for RulePlanner {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn plan(&self, request: &PlanRequest<'_>) -> Result<PlannerOutput, PlannerError> {
        let extraction =
            self.extract(request.canonical_text, request.today, request.awaiting_confirmation);

        let mut output = PlannerOutput::new(extraction.intent, extraction.confidence);
        output.slot_updates = extraction.slots;
        output.ambiguous_slots = extraction.ambiguous;
        output.rejected_slots = extraction.rejected;
        output.confirmation = extraction.confirmation;

        let output = self.guard.apply(request.current_intent, output);
        Ok(complete_missing(&self.schema, request, output))
    }
}

/// Resolves a loose date phrase ("tomorrow", "25 oct") the way [`RulePlanner`] would.
pub(crate) fn date_from_phrase(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let mut tokens = normalize(text).split_whitespace().map(str::to_string).collect::<Vec<_>>();
    let mut dates = extract_dates(&mut tokens, today);
    dedup_preserving_order(&mut dates);
    match dates.as_slice() {
        [date] => Some(*date),
        _ => None,
    }
}

/// Resolves a loose time phrase ("8 in the evening", "noon"). Bare hours stay unresolved.
pub(crate) fn time_from_phrase(text: &str) -> Option<NaiveTime> {
    let mut tokens = normalize(text).split_whitespace().map(str::to_string).collect::<Vec<_>>();
    let hint = meridiem_hint(&tokens);
    match extract_times(&mut tokens, hint) {
        TimeMentions::Exact(times) if times.len() == 1 => Some(times[0]),
        _ => None,
    }
}

fn record<T: PartialEq>(
    extraction: &mut Extraction,
    slot: SlotName,
    mut values: Vec<T>,
    to_value: impl Fn(&T) -> SlotValue,
    to_label: impl Fn(&T) -> String,
) {
    dedup_preserving_order(&mut values);
    match values.as_slice() {
        [] => {}
        [value] => {
            extraction.slots.insert(slot, to_value(value));
        }
        many => extraction.ambiguous.push(AmbiguousSlot {
            slot,
            candidates: many.iter().map(to_label).collect(),
        }),
    }
}

fn record_text(extraction: &mut Extraction, slot: SlotName, values: Vec<String>) {
    record(extraction, slot, values, |value| SlotValue::Text(value.clone()), Clone::clone);
}

fn dedup_preserving_order<T: PartialEq>(values: &mut Vec<T>) {
    let mut index = 0;
    while index < values.len() {
        if values[..index].contains(&values[index]) {
            values.remove(index);
        } else {
            index += 1;
        }
    }
}

fn mask_spans(text: &mut String, spans: impl Iterator<Item = (usize, usize)>) {
    for (start, end) in spans {
        text.replace_range(start..end, &" ".repeat(end - start));
    }
}

fn consume(tokens: &mut [String], range: std::ops::Range<usize>) {
    for token in &mut tokens[range] {
        token.clear();
    }
}

fn classify_intent(
    schema: &SchemaRegistry,
    tokens: &[String],
    slots: &BTreeMap<SlotName, SlotValue>,
) -> (Intent, f32) {
    let has = |words: &[&str]| tokens.iter().any(|token| words.contains(&token.as_str()));

    let (intent, base) = if has(&["cancel", "cancellation", "cancelled"]) {
        (Intent::Cancel, 0.95)
    } else if has(&["loyalty", "points", "tier", "membership", "rewards", "member"]) {
        (Intent::LoyaltyInfo, 0.9)
    } else if has(&["book", "reserve", "reservation", "booking"]) {
        (Intent::Book, 0.9)
    } else if has(&["available", "availability", "vacancy", "space"]) {
        (Intent::CheckAvailability, 0.85)
    } else if has(&[
        "recommend", "find", "search", "show", "options", "discover", "explore", "list",
    ]) {
        (Intent::Discover, 0.85)
    } else if has(&["table"]) {
        (Intent::Book, 0.7)
    } else if has(&["restaurant", "places", "place", "eat", "food", "hungry", "good", "best"]) {
        (Intent::Discover, 0.6)
    } else if has(&["hi", "hello", "hey", "thanks", "thank", "bye", "goodbye"]) {
        return (Intent::Smalltalk, 0.9);
    } else {
        return (Intent::Unknown, 0.0);
    };

    let supporting = slots.keys().filter(|slot| schema.declares(intent, **slot)).count();
    let confidence = (base + 0.02 * supporting as f32).min(1.0);
    (intent, confidence)
}

fn extract_confirmation(tokens: &[String]) -> Option<bool> {
    let yes = tokens.iter().any(|token| YES_WORDS.contains(&token.as_str()))
        || tokens.windows(2).any(|pair| {
            (pair[0] == "go" && pair[1] == "ahead") || (pair[0] == "try" && pair[1] == "again")
        });
    let no = tokens.iter().any(|token| NO_WORDS.contains(&token.as_str()));
    match (yes, no) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

fn extract_reservation_ids(tokens: &mut [String]) -> Vec<String> {
    let mut ids = Vec::new();
    for token in tokens.iter_mut() {
        let is_id = token.strip_prefix("rsv-").is_some_and(|rest| {
            rest.len() >= 4 && rest.chars().all(|ch| ch.is_ascii_alphanumeric())
        });
        if is_id {
            ids.push(std::mem::take(token));
        }
    }
    ids
}

/// Joins runs of digit groups ("+91 98100 12345") and validates them as a phone.
fn extract_phone(tokens: &mut [String]) -> Option<Result<String, InvalidSlotValue>> {
    let is_digits = |token: &str| {
        let body = token.strip_prefix('+').unwrap_or(token);
        !body.is_empty() && body.chars().all(|ch| ch.is_ascii_digit())
    };

    let mut index = 0;
    while index < tokens.len() {
        if !is_digits(&tokens[index]) {
            index += 1;
            continue;
        }
        let start = index;
        while index < tokens.len() && is_digits(&tokens[index]) {
            index += 1;
        }
        let group = tokens[start..index].join(" ");
        let digit_count = group.chars().filter(char::is_ascii_digit).count();
        let after_phone_word = start
            .checked_sub(1)
            .and_then(|prev| tokens.get(prev))
            .is_some_and(|word| matches!(word.as_str(), "phone" | "number" | "mobile" | "is"));

        if let Some(phone) = normalize_phone(&group) {
            consume(tokens, start..index);
            return Some(Ok(phone));
        }
        if after_phone_word && digit_count >= 5 {
            consume(tokens, start..index);
            return Some(Err(InvalidSlotValue {
                slot: SlotName::CustomerPhone,
                reason: format!("{group} is not a 10 to 13 digit phone number"),
            }));
        }
    }
    None
}

fn extract_dates(tokens: &mut [String], today: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index].clone();
        let next = tokens.get(index + 1).cloned().unwrap_or_default();
        let after_next = tokens.get(index + 2).cloned().unwrap_or_default();

        if token == "day" && next == "after" && after_next == "tomorrow" {
            dates.push(today + Duration::days(2));
            consume(tokens, index..index + 3);
            index += 3;
            continue;
        }
        if token == "tomorrow" {
            dates.push(today + Duration::days(1));
        } else if token == "today" || token == "tonight" {
            dates.push(today);
        } else if let Some(weekday) = lookup(WEEKDAYS, &token) {
            let mut ahead = (7 + weekday.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64)
                % 7;
            let previous = index.checked_sub(1).map(|prev| tokens[prev].as_str());
            if ahead == 0 && previous == Some("next") {
                ahead = 7;
            }
            dates.push(today + Duration::days(ahead));
        } else if let Some(date) = parse_date(&token) {
            dates.push(date);
        } else if let Some(date) = parse_day_month_slash(&token, today) {
            dates.push(date);
        } else if let (Some(day), Some(month)) = (parse_day(&token), lookup(MONTHS, &next)) {
            if let Some(date) = upcoming(today, month, day) {
                dates.push(date);
                consume(tokens, index..index + 2);
                index += 2;
                continue;
            }
        } else if let (Some(month), Some(day)) =
            (lookup(MONTHS, &token).filter(|_| token != "may"), parse_day(&next))
        {
            if let Some(date) = upcoming(today, month, day) {
                dates.push(date);
                consume(tokens, index..index + 2);
                index += 2;
                continue;
            }
        } else {
            index += 1;
            continue;
        }
        consume(tokens, index..index + 1);
        index += 1;
    }
    dates
}

fn parse_day_month_slash(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let (day, month) = token.split_once('/')?;
    if month.contains('/') {
        return None;
    }
    upcoming(today, month.parse().ok()?, day.parse().ok()?)
}

fn parse_day(token: &str) -> Option<u32> {
    let digits = token.trim_end_matches(|ch: char| ch.is_ascii_alphabetic());
    let suffix = &token[digits.len()..];
    if !matches!(suffix, "" | "st" | "nd" | "rd" | "th") {
        return None;
    }
    digits.parse::<u32>().ok().filter(|day| (1..=31).contains(day))
}

/// The next occurrence of a day/month on or after today.
fn upcoming(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year >= today {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    }
}

fn lookup<T: Copy>(table: &[(&str, T)], token: &str) -> Option<T> {
    table.iter().find(|(word, _)| *word == token).map(|(_, value)| *value)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum TimeMentions {
    None,
    Exact(Vec<NaiveTime>),
    Ambiguous(Vec<NaiveTime>),
}

fn meridiem_hint(tokens: &[String]) -> Option<Meridiem> {
    if tokens.iter().any(|token| PM_HINTS.contains(&token.as_str())) {
        Some(Meridiem::Pm)
    } else if tokens.iter().any(|token| AM_HINTS.contains(&token.as_str())) {
        Some(Meridiem::Am)
    } else {
        None
    }
}

struct Clock {
    hour: u32,
    minute: u32,
    zero_padded: bool,
    has_minutes: bool,
}

fn parse_clock(token: &str) -> Option<Clock> {
    let (hour, minute, has_minutes) = match token.split_once(':') {
        Some((hour, minute)) if minute.len() == 2 => (hour, minute.parse::<u32>().ok()?, true),
        Some(_) => return None,
        None => (token, 0, false),
    };
    if hour.is_empty() || hour.len() > 2 || !hour.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let zero_padded = hour.len() == 2 && hour.starts_with('0');
    let hour = hour.parse::<u32>().ok()?;
    (hour <= 23 && minute <= 59).then_some(Clock { hour, minute, zero_padded, has_minutes })
}

enum Resolved {
    Exact(NaiveTime),
    Ambiguous([NaiveTime; 2]),
}

fn resolve_clock(
    clock: &Clock,
    meridiem: Option<Meridiem>,
    hint: Option<Meridiem>,
) -> Option<Resolved> {
    let at = |hour: u32| NaiveTime::from_hms_opt(hour, clock.minute, 0);
    match meridiem.or(if clock.hour <= 12 && !clock.zero_padded { hint } else { None }) {
        Some(_) if clock.hour == 0 || clock.hour > 12 => {
            if meridiem.is_some() {
                None
            } else {
                at(clock.hour).map(Resolved::Exact)
            }
        }
        Some(Meridiem::Am) => at(clock.hour % 12).map(Resolved::Exact),
        Some(Meridiem::Pm) => at(clock.hour % 12 + 12).map(Resolved::Exact),
        None if clock.hour == 0 || clock.hour >= 13 || clock.zero_padded => {
            at(clock.hour).map(Resolved::Exact)
        }
        None => Some(Resolved::Ambiguous([at(clock.hour % 12)?, at(clock.hour % 12 + 12)?])),
    }
}

fn extract_times(tokens: &mut [String], hint: Option<Meridiem>) -> TimeMentions {
    let mut exact = Vec::new();
    let mut ambiguous = Vec::new();
    let mut push = |resolved: Option<Resolved>| match resolved {
        Some(Resolved::Exact(time)) => exact.push(time),
        Some(Resolved::Ambiguous(pair)) => ambiguous.extend(pair),
        None => {}
    };

    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index].clone();
        let next = tokens.get(index + 1).cloned().unwrap_or_default();

        let suffixed = token
            .strip_suffix("am")
            .map(|clock| (clock, Meridiem::Am))
            .or_else(|| token.strip_suffix("pm").map(|clock| (clock, Meridiem::Pm)));

        if token == "noon" {
            push(NaiveTime::from_hms_opt(12, 0, 0).map(Resolved::Exact));
            consume(tokens, index..index + 1);
        } else if token == "midnight" {
            push(NaiveTime::from_hms_opt(0, 0, 0).map(Resolved::Exact));
            consume(tokens, index..index + 1);
        } else if let Some(clock) = suffixed.and_then(|(clock, meridiem)| {
            parse_clock(clock).map(|parsed| (parsed, meridiem))
        }) {
            push(resolve_clock(&clock.0, Some(clock.1), hint));
            consume(tokens, index..index + 1);
        } else if let Some(clock) = parse_clock(&token) {
            let meridiem = match next.as_str() {
                "am" => Some(Meridiem::Am),
                "pm" => Some(Meridiem::Pm),
                _ => None,
            };
            let previous =
                index.checked_sub(1).map(|prev| tokens[prev].clone()).unwrap_or_default();
            if meridiem.is_some() {
                push(resolve_clock(&clock, meridiem, hint));
                consume(tokens, index..index + 2);
                index += 1;
            } else if clock.has_minutes || TIME_SUFFIXES.contains(&next.as_str()) {
                push(resolve_clock(&clock, None, hint));
                let end =
                    if TIME_SUFFIXES.contains(&next.as_str()) { index + 2 } else { index + 1 };
                consume(tokens, index..end);
                index = end - 1;
            } else if previous == "at" || previous == "by" || previous == "around" {
                push(resolve_clock(&clock, None, hint));
                consume(tokens, index - 1..index + 1);
            }
        }
        index += 1;
    }

    if !exact.is_empty() {
        dedup_preserving_order(&mut exact);
        TimeMentions::Exact(exact)
    } else if !ambiguous.is_empty() {
        dedup_preserving_order(&mut ambiguous);
        TimeMentions::Ambiguous(ambiguous)
    } else {
        TimeMentions::None
    }
}

fn parse_count(token: &str) -> Option<u32> {
    if let Some(value) = lookup(NUMBER_WORDS, token) {
        return Some(value);
    }
    if token.is_empty() || token.len() > 3 || !token.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn extract_party_sizes(tokens: &mut [String]) -> Vec<u32> {
    let mut sizes = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index].clone();
        let next = tokens.get(index + 1).cloned().unwrap_or_default();
        let after_next = tokens.get(index + 2).cloned().unwrap_or_default();

        if let Some(count) = parse_count(&token) {
            if PEOPLE_WORDS.contains(&next.as_str()) {
                sizes.push(count);
                consume(tokens, index..index + 2);
                index += 2;
                continue;
            }
            if next == "of" && after_next == "us" {
                sizes.push(count);
                consume(tokens, index..index + 3);
                index += 3;
                continue;
            }
        }

        let lead = match (token.as_str(), next.as_str()) {
            ("for", _) => Some(1),
            ("party" | "group", "of") | ("we", "are") => Some(2),
            _ => None,
        };
        if let Some(offset) = lead {
            let candidate = tokens.get(index + offset).cloned().unwrap_or_default();
            let follower = tokens.get(index + offset + 1).cloned().unwrap_or_default();
            if let Some(count) = parse_count(&candidate) {
                if !TIME_SUFFIXES.contains(&follower.as_str()) {
                    sizes.push(count);
                    consume(tokens, index..index + offset + 1);
                    index += offset + 1;
                    continue;
                }
            }
        }
        index += 1;
    }
    sizes
}

fn extract_customer_name(tokens: &[String]) -> Option<String> {
    let live =
        tokens.iter().filter(|token| !token.is_empty()).map(String::as_str).collect::<Vec<_>>();
    let start = live.windows(2).enumerate().find_map(|(index, pair)| match pair {
        ["name", "is"] | ["name", "of"] | ["naam", _] => {
            Some(if pair[0] == "naam" { index + 1 } else { index + 2 })
        }
        ["under", "name"] => Some(index + 2),
        ["under", "the"] if live.get(index + 2) == Some(&"name") => Some(index + 3),
        _ => None,
    })?;

    let words = live
        .iter()
        .skip(start)
        .take_while(|word| {
            word.chars().all(|ch| ch.is_alphabetic()) && !NAME_STOPWORDS.contains(word)
        })
        .take(2)
        .map(|word| title_case(word))
        .collect::<Vec<_>>();

    (!words.is_empty()).then(|| words.join(" "))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
