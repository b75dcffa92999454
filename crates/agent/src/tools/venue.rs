//! Read-mostly extras that no intent routes to: menus, upcoming events and
//! guest feedback.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate, Utc};
use serde_json::json;
use tracing::info;

use concierge_core::domain::restaurant::{Restaurant, RestaurantId};
use concierge_core::domain::venue::{Feedback, Rating};
use concierge_db::repositories::{RestaurantRepository, VenueRepository};

use super::availability::unknown_restaurant;
use super::{ArgKind, ArgSpec, Tool, ToolCall, ToolError, ToolResponse, ToolSpec};

pub const MENU: &str = "get_menu";
pub const EVENTS: &str = "list_upcoming_events";
pub const FEEDBACK: &str = "log_feedback";

const DEFAULT_EVENT_WINDOW_DAYS: u32 = 30;
const MAX_EVENT_WINDOW_DAYS: u32 = 365;

pub struct GetMenuTool {
    restaurants: Arc<dyn RestaurantRepository>,
    venues: Arc<dyn VenueRepository>,
}

impl GetMenuTool {
    pub fn new(
        restaurants: Arc<dyn RestaurantRepository>,
        venues: Arc<dyn VenueRepository>,
    ) -> Self {
        Self { restaurants, venues }
    }
}

#[async_trait]
impl Tool for GetMenuTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: MENU,
            description: "Dishes served at a restaurant, signature dishes first",
            args: vec![
                ArgSpec::required("restaurant_id", ArgKind::String),
                ArgSpec::optional("category", ArgKind::String),
            ],
            idempotent: true,
            accepts_idempotency_token: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResponse, ToolError> {
        let restaurant_id = RestaurantId(call.str_arg("restaurant_id")?.to_string());
        let category = call.opt_str_arg("category").map(str::trim);

        let Some(restaurant) = self.restaurants.find_by_id(&restaurant_id).await? else {
            return Ok(unknown_restaurant(&restaurant_id));
        };
        let items = self.venues.menu(&restaurant_id, category).await?;

        Ok(ToolResponse::Completed {
            data: json!({
                "restaurant_id": restaurant.id.0,
                "restaurant_name": restaurant.name,
                "category": category,
                "items": items
                    .iter()
                    .map(|item| json!({
                        "name": item.name,
                        "category": item.category,
                        "price_inr": item.price_inr,
                        "signature": item.signature,
                    }))
                    .collect::<Vec<_>>(),
            }),
        })
    }
}

pub struct ListUpcomingEventsTool {
    restaurants: Arc<dyn RestaurantRepository>,
    venues: Arc<dyn VenueRepository>,
}

impl ListUpcomingEventsTool {
    pub fn new(
        restaurants: Arc<dyn RestaurantRepository>,
        venues: Arc<dyn VenueRepository>,
    ) -> Self {
        Self { restaurants, venues }
    }
}

#[async_trait]
impl Tool for ListUpcomingEventsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: EVENTS,
            description: "Events at catalog restaurants in the coming days, optionally in one city",
            args: vec![
                ArgSpec::optional("city", ArgKind::String),
                ArgSpec::optional("within_days", ArgKind::Integer),
                ArgSpec::optional("from", ArgKind::String),
            ],
            idempotent: true,
            accepts_idempotency_token: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResponse, ToolError> {
        let invalid =
            |reason: String| ToolError::InvalidArguments { tool: call.tool.clone(), reason };
        let from = match call.opt_str_arg("from") {
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| invalid(format!("`from` must be YYYY-MM-DD, got {raw}")))?,
            None => Local::now().date_naive(),
        };
        let within_days = call.opt_u32_arg("within_days")?.unwrap_or(DEFAULT_EVENT_WINDOW_DAYS);
        if within_days > MAX_EVENT_WINDOW_DAYS {
            return Err(invalid(format!(
                "`within_days` must be at most {MAX_EVENT_WINDOW_DAYS}, got {within_days}"
            )));
        }
        let until = from + Duration::days(i64::from(within_days));
        let city = call.opt_str_arg("city").map(|city| city.trim().to_lowercase());

        let restaurants: HashMap<RestaurantId, Restaurant> = self
            .restaurants
            .list_all()
            .await?
            .into_iter()
            .map(|restaurant| (restaurant.id.clone(), restaurant))
            .collect();

        let mut events = Vec::new();
        for event in self.venues.events_between(from, until).await? {
            let Some(restaurant) = restaurants.get(&event.restaurant_id) else {
                continue;
            };
            if city.as_ref().is_some_and(|city| !restaurant.city.to_lowercase().contains(city)) {
                continue;
            }
            events.push(json!({
                "id": event.id,
                "restaurant_id": event.restaurant_id.0,
                "restaurant_name": restaurant.name,
                "city": restaurant.city,
                "name": event.name,
                "date": event.date.format("%Y-%m-%d").to_string(),
                "description": event.description,
            }));
        }

        Ok(ToolResponse::Completed {
            data: json!({
                "from": from.format("%Y-%m-%d").to_string(),
                "until": until.format("%Y-%m-%d").to_string(),
                "events": events,
            }),
        })
    }
}

pub struct LogFeedbackTool {
    restaurants: Arc<dyn RestaurantRepository>,
    venues: Arc<dyn VenueRepository>,
}

impl LogFeedbackTool {
    pub fn new(
        restaurants: Arc<dyn RestaurantRepository>,
        venues: Arc<dyn VenueRepository>,
    ) -> Self {
        Self { restaurants, venues }
    }
}

#[async_trait]
impl Tool for LogFeedbackTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: FEEDBACK,
            description: "Record a guest's 1-5 star rating and comment for a restaurant",
            args: vec![
                ArgSpec::required("restaurant_id", ArgKind::String),
                ArgSpec::required("rating", ArgKind::Integer),
                ArgSpec::optional("customer_name", ArgKind::String),
                ArgSpec::optional("comment", ArgKind::String),
            ],
            idempotent: false,
            accepts_idempotency_token: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResponse, ToolError> {
        let restaurant_id = RestaurantId(call.str_arg("restaurant_id")?.to_string());
        let stars = call.u32_arg("rating")?;
        let rating = u8::try_from(stars).ok().and_then(Rating::new).ok_or_else(|| {
            ToolError::InvalidArguments {
                tool: call.tool.clone(),
                reason: format!("`rating` must be 1-{}, got {stars}", Rating::MAX),
            }
        })?;

        if self.restaurants.find_by_id(&restaurant_id).await?.is_none() {
            return Ok(unknown_restaurant(&restaurant_id));
        }

        let feedback = Feedback {
            restaurant_id: restaurant_id.clone(),
            customer_name: call.opt_str_arg("customer_name").map(|name| name.trim().to_string()),
            rating,
            comment: call.opt_str_arg("comment").map(|comment| comment.trim().to_string()),
            created_at: Utc::now(),
        };
        self.venues.record_feedback(feedback).await?;
        info!(
            event_name = "tool.feedback.recorded",
            restaurant_id = %restaurant_id.0,
            rating = rating.stars(),
            "guest feedback recorded"
        );

        Ok(ToolResponse::Completed {
            data: json!({
                "restaurant_id": restaurant_id.0,
                "rating": rating.stars(),
                "status": "recorded",
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map, Value};

    use concierge_core::domain::restaurant::RestaurantId;
    use concierge_db::fixtures::DemoCatalog;
    use concierge_db::repositories::{
        InMemoryRestaurantRepository, InMemoryVenueRepository, VenueRepository,
    };

    use super::{GetMenuTool, ListUpcomingEventsTool, LogFeedbackTool};
    use crate::tools::{DeclineReason, Tool, ToolCall, ToolError, ToolResponse};

    async fn stores() -> (Arc<InMemoryRestaurantRepository>, Arc<InMemoryVenueRepository>) {
        let restaurants =
            Arc::new(InMemoryRestaurantRepository::with_restaurants(DemoCatalog::restaurants()));
        let venues = Arc::new(InMemoryVenueRepository::default());
        DemoCatalog::load_venues_into(venues.as_ref()).await.expect("seed venues");
        (restaurants, venues)
    }

    fn call(tool: &str, args: Value) -> ToolCall {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ToolCall::new(tool, args)
    }

    fn completed(response: ToolResponse) -> Value {
        match response {
            ToolResponse::Completed { data } => data,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn menu_puts_signature_dishes_first_and_filters_by_category() {
        let (restaurants, venues) = stores().await;
        let tool = GetMenuTool::new(restaurants, venues);

        let data = completed(
            tool.execute(&call(super::MENU, json!({ "restaurant_id": "karims-delhi" })))
                .await
                .expect("menu"),
        );
        assert_eq!(data["restaurant_name"], "Karim's");
        assert_eq!(data["items"][0]["name"], "Chicken Jahangiri");
        assert_eq!(data["items"][0]["signature"], true);

        let desserts = completed(
            tool.execute(&call(
                super::MENU,
                json!({ "restaurant_id": "karims-delhi", "category": "dessert" }),
            ))
            .await
            .expect("desserts"),
        );
        assert_eq!(desserts["items"], json!([
            { "name": "Phirni", "category": "Dessert", "price_inr": 90, "signature": false }
        ]));
    }

    #[tokio::test]
    async fn menu_for_unknown_restaurant_is_declined() {
        let (restaurants, venues) = stores().await;
        let response = GetMenuTool::new(restaurants, venues)
            .execute(&call(super::MENU, json!({ "restaurant_id": "nowhere" })))
            .await
            .expect("menu");
        assert!(matches!(
            response,
            ToolResponse::Declined { reason: DeclineReason::UnknownRestaurant, .. }
        ));
    }

    #[tokio::test]
    async fn events_respect_window_and_city() {
        let (restaurants, venues) = stores().await;
        let tool = ListUpcomingEventsTool::new(restaurants, venues);

        let month = completed(
            tool.execute(&call(super::EVENTS, json!({ "from": "2026-10-19" })))
                .await
                .expect("events"),
        );
        assert_eq!(month["until"], "2026-11-18");
        let names: Vec<&str> = month["events"]
            .as_array()
            .map(|events| events.iter().filter_map(|event| event["name"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(
            names,
            vec![
                "Old Delhi Food Walk",
                "Raan Carving Night",
                "Parsi New Year Lunch",
                "Park Street Jazz Evening"
            ]
        );

        let kolkata = completed(
            tool.execute(&call(
                super::EVENTS,
                json!({ "from": "2026-10-19", "within_days": 90, "city": "kolkata" }),
            ))
            .await
            .expect("kolkata"),
        );
        assert_eq!(kolkata["events"].as_array().map(Vec::len), Some(1));
        assert_eq!(kolkata["events"][0]["restaurant_name"], "Peter Cat");
    }

    #[tokio::test]
    async fn oversized_event_window_is_rejected() {
        let (restaurants, venues) = stores().await;
        let error = ListUpcomingEventsTool::new(restaurants, venues)
            .execute(&call(super::EVENTS, json!({ "within_days": 4000 })))
            .await
            .expect_err("window too large");
        assert!(matches!(error, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn feedback_is_recorded_with_a_valid_rating_only() {
        let (restaurants, venues) = stores().await;
        let tool = LogFeedbackTool::new(restaurants, venues.clone());

        let data = completed(
            tool.execute(&call(
                super::FEEDBACK,
                json!({
                    "restaurant_id": "bukhara-delhi",
                    "rating": 5,
                    "customer_name": "Asha",
                    "comment": "  the dal was worth the wait "
                }),
            ))
            .await
            .expect("feedback"),
        );
        assert_eq!(data["status"], "recorded");

        let stored = venues
            .feedback_for(&RestaurantId("bukhara-delhi".to_string()))
            .await
            .expect("stored feedback");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].comment.as_deref(), Some("the dal was worth the wait"));

        let error = tool
            .execute(&call(
                super::FEEDBACK,
                json!({ "restaurant_id": "bukhara-delhi", "rating": 7 }),
            ))
            .await
            .expect_err("rating out of range");
        assert!(matches!(error, ToolError::InvalidArguments { .. }));
    }
}
