use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use concierge_core::domain::reservation::CapacityKey;
use concierge_core::domain::restaurant::{Restaurant, RestaurantFilter};
use concierge_db::repositories::{CapacityStore, RestaurantRepository};

use super::{ArgKind, ArgSpec, Tool, ToolCall, ToolError, ToolResponse, ToolSpec};

pub const NAME: &str = "discover_restaurants";
pub const MAX_RESULTS: usize = 6;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RestaurantSummary {
    pub id: String,
    pub name: String,
    pub cuisine: String,
    pub neighborhood: String,
    pub price_label: String,
    pub avg_price_inr: u32,
    pub rating: f32,
    pub veg_only: bool,
    /// Only known when a date and time were given.
    pub seats_available: Option<u32>,
    pub fits: bool,
}

impl RestaurantSummary {
    fn new(restaurant: &Restaurant, seats_available: Option<u32>, party_size: u32) -> Self {
        Self {
            id: restaurant.id.0.clone(),
            name: restaurant.name.clone(),
            cuisine: restaurant.cuisine.clone(),
            neighborhood: restaurant.neighborhood.clone(),
            price_label: restaurant.price_label.clone(),
            avg_price_inr: restaurant.avg_price_inr,
            rating: restaurant.rating,
            veg_only: restaurant.veg_only,
            seats_available,
            fits: seats_available.unwrap_or(restaurant.capacity) >= party_size,
        }
    }
}

pub struct DiscoverRestaurantsTool {
    restaurants: Arc<dyn RestaurantRepository>,
    capacity: Arc<dyn CapacityStore>,
}

impl DiscoverRestaurantsTool {
    pub fn new(
        restaurants: Arc<dyn RestaurantRepository>,
        capacity: Arc<dyn CapacityStore>,
    ) -> Self {
        Self { restaurants, capacity }
    }
}

#[async_trait]
impl Tool for DiscoverRestaurantsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: NAME,
            description: "Top rated restaurants in a city, optionally by cuisine, \
                          with seats at a given slot",
            args: vec![
                ArgSpec::required("city", ArgKind::String),
                ArgSpec::required("party_size", ArgKind::Integer),
                ArgSpec::optional("cuisine", ArgKind::String),
                ArgSpec::optional("date", ArgKind::String),
                ArgSpec::optional("time", ArgKind::String),
            ],
            idempotent: true,
            accepts_idempotency_token: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResponse, ToolError> {
        let city = call.str_arg("city")?;
        let party_size = call.u32_arg("party_size")?;
        let cuisine = call.opt_str_arg("cuisine");
        let slot = match (call.opt_str_arg("date"), call.opt_str_arg("time")) {
            (Some(date), Some(time)) => Some(super::parse_slot_args(call, date, time)?),
            _ => None,
        };

        let filter = RestaurantFilter {
            city: Some(city.to_string()),
            cuisine: cuisine.map(str::to_string),
            ..RestaurantFilter::default()
        };
        let matches = self.restaurants.search(&filter).await?;

        let mut results = Vec::with_capacity(MAX_RESULTS.min(matches.len()));
        for restaurant in matches.iter().take(MAX_RESULTS) {
            let seats = match slot {
                Some((date, time)) => Some(
                    self.capacity
                        .check_availability(&CapacityKey::new(restaurant.id.clone(), date, time))
                        .await?,
                ),
                None => None,
            };
            results.push(RestaurantSummary::new(restaurant, seats, party_size));
        }

        Ok(ToolResponse::Completed {
            data: json!({
                "city": city,
                "cuisine": cuisine,
                "party_size": party_size,
                "date": call.opt_str_arg("date"),
                "time": call.opt_str_arg("time"),
                "restaurants": results,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveTime};
    use serde_json::{json, Map, Value};

    use concierge_core::domain::reservation::CapacityKey;
    use concierge_core::domain::restaurant::RestaurantId;
    use concierge_db::fixtures::DemoCatalog;
    use concierge_db::repositories::{InMemoryCapacityStore, InMemoryRestaurantRepository};

    use super::{DiscoverRestaurantsTool, MAX_RESULTS};
    use crate::tools::{Tool, ToolCall, ToolResponse};

    fn tool() -> (DiscoverRestaurantsTool, Arc<InMemoryCapacityStore>) {
        let restaurants =
            Arc::new(InMemoryRestaurantRepository::with_restaurants(DemoCatalog::restaurants()));
        let capacity = Arc::new(InMemoryCapacityStore::new(restaurants.clone()));
        (DiscoverRestaurantsTool::new(restaurants, capacity.clone()), capacity)
    }

    fn call(args: Value) -> ToolCall {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ToolCall::new(super::NAME, args)
    }

    fn data(response: ToolResponse) -> Value {
        match response {
            ToolResponse::Completed { data } => data,
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn lists_city_restaurants_best_rated_first() {
        let (tool, _) = tool();
        let response = tool.execute(&call(json!({"city": "Delhi", "party_size": 6}))).await;
        let data = data(response.expect("discover"));

        let restaurants = data["restaurants"].as_array().expect("array");
        assert!(!restaurants.is_empty() && restaurants.len() <= MAX_RESULTS);
        let ratings =
            restaurants.iter().filter_map(|entry| entry["rating"].as_f64()).collect::<Vec<_>>();
        assert!(ratings.windows(2).all(|pair| pair[0] >= pair[1]));
        assert!(restaurants.iter().all(|entry| entry["seats_available"].is_null()));
    }

    #[tokio::test]
    async fn reports_seats_and_fit_for_a_requested_slot() {
        let (tool, capacity) = tool();
        let date = NaiveDate::from_ymd_opt(2026, 10, 20).expect("date");
        let time = NaiveTime::from_hms_opt(20, 0, 0).expect("time");
        capacity
            .seed_slot(
                CapacityKey::new(RestaurantId("karims-delhi".to_string()), date, time),
                40,
                38,
            )
            .await;

        let data = data(
            tool.execute(&call(json!({
                "city": "delhi", "party_size": 6, "cuisine": "mughlai",
                "date": "2026-10-20", "time": "20:00"
            })))
            .await
            .expect("discover"),
        );

        let karims = data["restaurants"]
            .as_array()
            .and_then(|entries| entries.iter().find(|entry| entry["id"] == "karims-delhi"))
            .expect("karims listed");
        assert_eq!(karims["seats_available"], 2);
        assert_eq!(karims["fits"], false);
    }
}
