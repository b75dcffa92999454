use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::restaurant::RestaurantId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub category: String,
    pub price_inr: u32,
    /// House specialities are listed first.
    pub signature: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueEvent {
    pub id: String,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub date: NaiveDate,
    pub description: String,
}

/// Whole stars, 1 through 5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MAX: u8 = 5;

    pub fn new(stars: u8) -> Option<Self> {
        (1..=Self::MAX).contains(&stars).then_some(Self(stars))
    }

    pub fn stars(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = String;

    fn try_from(stars: u8) -> Result<Self, Self::Error> {
        Self::new(stars).ok_or_else(|| format!("rating must be 1-{}, got {stars}", Self::MAX))
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub restaurant_id: RestaurantId,
    pub customer_name: Option<String>,
    pub rating: Rating,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
