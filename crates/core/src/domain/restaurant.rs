use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RestaurantId(pub String);

impl std::fmt::Display for RestaurantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    pub aliases: Vec<String>,
    pub cuisine: String,
    pub city: String,
    pub neighborhood: String,
    pub price_label: String,
    pub avg_price_inr: u32,
    pub rating: f32,
    pub capacity: u32,
    pub veg_only: bool,
}

impl Restaurant {
    /// Lower-cased name plus aliases, used for mention matching.
    pub fn match_terms(&self) -> Vec<String> {
        let mut terms = vec![self.name.to_lowercase()];
        terms.extend(self.aliases.iter().map(|alias| alias.to_lowercase()));
        terms
    }
}

/// Search filter for restaurant discovery. Text fields match case-insensitively.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RestaurantFilter {
    pub city: Option<String>,
    pub cuisine: Option<String>,
    pub veg_only: Option<bool>,
    pub min_rating: Option<f32>,
}

impl RestaurantFilter {
    pub fn matches(&self, restaurant: &Restaurant) -> bool {
        let city_ok = self
            .city
            .as_ref()
            .map(|city| restaurant.city.eq_ignore_ascii_case(city.trim()))
            .unwrap_or(true);
        let cuisine_ok = self
            .cuisine
            .as_ref()
            .map(|cuisine| {
                restaurant.cuisine.to_lowercase().contains(&cuisine.trim().to_lowercase())
            })
            .unwrap_or(true);
        let veg_ok = self.veg_only.map(|veg| restaurant.veg_only == veg).unwrap_or(true);
        let rating_ok = self.min_rating.map(|min| restaurant.rating >= min).unwrap_or(true);
        city_ok && cuisine_ok && veg_ok && rating_ok
    }
}

/// Ranking used by discovery: rating descending, then cheaper first.
pub fn discovery_order(left: &Restaurant, right: &Restaurant) -> std::cmp::Ordering {
    right
        .rating
        .partial_cmp(&left.rating)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| left.avg_price_inr.cmp(&right.avg_price_inr))
        .then_with(|| left.id.cmp(&right.id))
}
