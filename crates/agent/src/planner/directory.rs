use std::collections::{BTreeMap, BTreeSet};

use concierge_core::domain::restaurant::{Restaurant, RestaurantId};

use crate::normalizer::normalize;

/// A phrase found in canonical text, with the byte span it occupied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhraseMatch<T> {
    pub value: T,
    pub phrase: String,
    pub start: usize,
    pub end: usize,
}

/// Vocabulary the planners resolve mentions against: restaurant names and
/// aliases, cities and cuisines, all in normalizer form.
#[derive(Clone, Debug, Default)]
pub struct RestaurantDirectory {
    terms: Vec<(String, RestaurantId)>,
    names: BTreeMap<RestaurantId, String>,
    cities: BTreeMap<String, String>,
    cuisines: BTreeMap<String, String>,
}

impl RestaurantDirectory {
    pub fn from_restaurants(restaurants: &[Restaurant]) -> Self {
        let mut directory = Self::default();
        for restaurant in restaurants {
            directory.names.insert(restaurant.id.clone(), restaurant.name.clone());
            for term in restaurant.match_terms() {
                let term = normalize(&term);
                if !term.is_empty() {
                    directory.terms.push((term, restaurant.id.clone()));
                }
            }
            directory.cities.insert(normalize(&restaurant.city), restaurant.city.clone());
            directory.cuisines.insert(normalize(&restaurant.cuisine), restaurant.cuisine.clone());
        }
        // Longest phrases first so "6 ballygunge place" wins over shorter overlaps.
        directory.terms.sort_by(|left, right| {
            right.0.len().cmp(&left.0.len()).then_with(|| left.0.cmp(&right.0))
        });
        directory.terms.dedup();
        directory
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn display_name(&self, id: &RestaurantId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &RestaurantId) -> bool {
        self.names.contains_key(id)
    }

    pub fn restaurants(&self) -> impl Iterator<Item = (&RestaurantId, &str)> {
        self.names.iter().map(|(id, name)| (id, name.as_str()))
    }

    pub fn cities(&self) -> impl Iterator<Item = &str> {
        self.cities.values().map(String::as_str)
    }

    pub fn cuisines(&self) -> impl Iterator<Item = &str> {
        self.cuisines.values().map(String::as_str)
    }

    pub fn canonical_city(&self, text: &str) -> Option<&str> {
        self.cities.get(&normalize(text)).map(String::as_str)
    }

    /// Resolves a free-form restaurant reference (id, name or alias).
    pub fn resolve_restaurant(&self, text: &str) -> Vec<RestaurantId> {
        let lowered = text.trim().to_lowercase();
        let by_id = RestaurantId(lowered.clone());
        if self.names.contains_key(&by_id) {
            return vec![by_id];
        }
        let canonical = normalize(&lowered);
        let ids = self
            .terms
            .iter()
            .filter(|(term, _)| *term == canonical)
            .map(|(_, id)| id.clone())
            .collect::<BTreeSet<_>>();
        ids.into_iter().collect()
    }

    pub fn find_restaurants(&self, text: &str) -> Vec<PhraseMatch<RestaurantId>> {
        let mut found: Vec<PhraseMatch<RestaurantId>> = Vec::new();
        for (term, id) in &self.terms {
            for (start, end) in phrase_spans(text, term) {
                let overlaps = found.iter().any(|hit| start < hit.end && hit.start < end);
                if !overlaps {
                    found.push(PhraseMatch { value: id.clone(), phrase: term.clone(), start, end });
                }
            }
        }
        found.sort_by_key(|hit| hit.start);
        found
    }

    pub fn find_cities(&self, text: &str) -> Vec<PhraseMatch<String>> {
        find_in_vocabulary(&self.cities, text)
    }

    pub fn find_cuisines(&self, text: &str) -> Vec<PhraseMatch<String>> {
        find_in_vocabulary(&self.cuisines, text)
    }
}

fn find_in_vocabulary(
    vocabulary: &BTreeMap<String, String>,
    text: &str,
) -> Vec<PhraseMatch<String>> {
    let mut entries = vocabulary.iter().collect::<Vec<_>>();
    entries.sort_by(|left, right| right.0.len().cmp(&left.0.len()));

    let mut found: Vec<PhraseMatch<String>> = Vec::new();
    for (phrase, canonical) in entries {
        for (start, end) in phrase_spans(text, phrase) {
            let overlaps = found.iter().any(|hit| start < hit.end && hit.start < end);
            if !overlaps {
                found.push(PhraseMatch {
                    value: canonical.clone(),
                    phrase: phrase.clone(),
                    start,
                    end,
                });
            }
        }
    }
    found.sort_by_key(|hit| hit.start);
    found
}

/// Byte spans where `phrase` occurs in `text` on word boundaries.
pub(crate) fn phrase_spans(text: &str, phrase: &str) -> Vec<(usize, usize)> {
    if phrase.is_empty() {
        return Vec::new();
    }
    let mut spans = Vec::new();
    let mut offset = 0;
    while let Some(found) = text[offset..].find(phrase) {
        let start = offset + found;
        let end = start + phrase.len();
        let left_ok = text[..start].chars().next_back().map_or(true, |ch| ch == ' ');
        let right_ok = text[end..].chars().next().map_or(true, |ch| ch == ' ');
        if left_ok && right_ok {
            spans.push((start, end));
        }
        offset = end;
    }
    spans
}

#[cfg(test)]
mod tests {
    use concierge_core::domain::restaurant::{Restaurant, RestaurantId};

    use super::{phrase_spans, RestaurantDirectory};

    fn restaurant(id: &str, name: &str, aliases: &[&str], city: &str, cuisine: &str) -> Restaurant {
        Restaurant {
            id: RestaurantId(id.to_string()),
            name: name.to_string(),
            aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
            cuisine: cuisine.to_string(),
            city: city.to_string(),
            neighborhood: String::new(),
            price_label: "Mid".to_string(),
            avg_price_inr: 700,
            rating: 4.5,
            capacity: 40,
            veg_only: false,
        }
    }

    fn directory() -> RestaurantDirectory {
        RestaurantDirectory::from_restaurants(&[
            restaurant("karims-delhi", "Karim's", &["karim"], "Delhi", "Mughlai"),
            restaurant("sardar-mumbai", "Sardar Pav Bhaji", &["sardar"], "Mumbai", "Mumbai Style"),
        ])
    }

    #[test]
    fn phrase_spans_respect_word_boundaries() {
        assert_eq!(phrase_spans("book karims now", "karims"), vec![(5, 11)]);
        assert!(phrase_spans("bookkarims", "karims").is_empty());
    }

    #[test]
    fn names_are_matched_in_normalized_form() {
        let hits = directory().find_restaurants("book karims for 6");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, RestaurantId("karims-delhi".to_string()));
    }

    #[test]
    fn longer_cuisine_phrase_shadows_city_inside_it() {
        let directory = directory();
        let cuisines = directory.find_cuisines("mumbai style food in delhi");
        assert_eq!(cuisines.len(), 1);
        assert_eq!(cuisines[0].value, "Mumbai Style");
        assert_eq!(directory.canonical_city("DELHI"), Some("Delhi"));
    }

    #[test]
    fn resolves_ids_names_and_aliases() {
        let directory = directory();
        let karims = vec![RestaurantId("karims-delhi".to_string())];
        assert_eq!(directory.resolve_restaurant("karims-delhi"), karims);
        assert_eq!(directory.resolve_restaurant("Karim's"), karims);
        assert_eq!(directory.resolve_restaurant("karim"), karims);
        assert!(directory.resolve_restaurant("nowhere").is_empty());
    }
}
