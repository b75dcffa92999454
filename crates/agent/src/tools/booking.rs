use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use concierge_core::domain::reservation::{
    CancelOutcome, CapacityKey, OperationKey, ReservationId, ReservationRecord, ReserveOutcome,
    ReserveRequest,
};
use concierge_core::domain::restaurant::{Restaurant, RestaurantFilter, RestaurantId};
use concierge_db::repositories::{CapacityStore, RepositoryError, RestaurantRepository};

use super::availability::unknown_restaurant;
use super::{
    parse_slot_args, ArgKind, ArgSpec, DeclineReason, Tool, ToolCall, ToolError, ToolResponse,
    ToolSpec,
};

pub const BOOK_NAME: &str = "book_table";
pub const CANCEL_NAME: &str = "cancel_reservation";
pub const MAX_ALTERNATIVES: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alternative {
    pub id: String,
    pub name: String,
    pub cuisine: String,
    pub rating: f32,
    pub seats_available: u32,
}

pub struct BookTableTool {
    restaurants: Arc<dyn RestaurantRepository>,
    capacity: Arc<dyn CapacityStore>,
}

impl BookTableTool {
    pub fn new(
        restaurants: Arc<dyn RestaurantRepository>,
        capacity: Arc<dyn CapacityStore>,
    ) -> Self {
        Self { restaurants, capacity }
    }

    /// Other restaurants in the same city that can seat the party at the same slot.
    async fn alternatives(
        &self,
        original: &Restaurant,
        date: NaiveDate,
        time: NaiveTime,
        party_size: u32,
    ) -> Result<Vec<Alternative>, ToolError> {
        let filter =
            RestaurantFilter { city: Some(original.city.clone()), ..RestaurantFilter::default() };
        let mut alternatives = Vec::new();
        for candidate in self.restaurants.search(&filter).await? {
            if candidate.id == original.id {
                continue;
            }
            let seats = self
                .capacity
                .check_availability(&CapacityKey::new(candidate.id.clone(), date, time))
                .await?;
            if seats >= party_size {
                alternatives.push(Alternative {
                    id: candidate.id.0,
                    name: candidate.name,
                    cuisine: candidate.cuisine,
                    rating: candidate.rating,
                    seats_available: seats,
                });
            }
            if alternatives.len() == MAX_ALTERNATIVES {
                break;
            }
        }
        Ok(alternatives)
    }
}

#[async_trait]
impl Tool for BookTableTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: BOOK_NAME,
            description: "Reserve seats for a party at a restaurant, date and time",
            args: vec![
                ArgSpec::required("restaurant_id", ArgKind::String),
                ArgSpec::required("date", ArgKind::String),
                ArgSpec::required("time", ArgKind::String),
                ArgSpec::required("party_size", ArgKind::Integer),
                ArgSpec::optional("customer_name", ArgKind::String),
            ],
            idempotent: false,
            accepts_idempotency_token: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResponse, ToolError> {
        let restaurant_id = RestaurantId(call.str_arg("restaurant_id")?.to_string());
        let (date, time) = parse_slot_args(call, call.str_arg("date")?, call.str_arg("time")?)?;
        let party_size = call.u32_arg("party_size")?;

        let Some(restaurant) = self.restaurants.find_by_id(&restaurant_id).await? else {
            return Ok(unknown_restaurant(&restaurant_id));
        };

        let request = ReserveRequest {
            key: CapacityKey::new(restaurant_id.clone(), date, time),
            party_size,
            customer_name: call.opt_str_arg("customer_name").map(str::to_string),
            idempotency_key: call.idempotency_token.clone().map(OperationKey),
        };

        match self.capacity.reserve(request).await {
            Ok(ReserveOutcome::Confirmed(record)) => {
                info!(
                    event_name = "tool.book_table.confirmed",
                    reservation_id = %record.id,
                    key = %record.key(),
                    party_size = record.party_size,
                    "reservation confirmed"
                );
                Ok(ToolResponse::Completed { data: reservation_json(&record, &restaurant) })
            }
            Ok(ReserveOutcome::CapacityExceeded { seats_available }) => {
                let alternatives = self.alternatives(&restaurant, date, time, party_size).await?;
                Ok(ToolResponse::Declined {
                    reason: DeclineReason::CapacityExceeded,
                    data: json!({
                        "restaurant_id": restaurant.id.0,
                        "restaurant_name": restaurant.name,
                        "date": date.format("%Y-%m-%d").to_string(),
                        "time": time.format("%H:%M").to_string(),
                        "party_size": party_size,
                        "seats_available": seats_available,
                        "alternatives": alternatives,
                    }),
                })
            }
            Err(RepositoryError::UnknownRestaurant(id)) => Ok(unknown_restaurant(&id)),
            Err(error) => Err(error.into()),
        }
    }
}

pub struct CancelReservationTool {
    restaurants: Arc<dyn RestaurantRepository>,
    capacity: Arc<dyn CapacityStore>,
}

impl CancelReservationTool {
    pub fn new(
        restaurants: Arc<dyn RestaurantRepository>,
        capacity: Arc<dyn CapacityStore>,
    ) -> Self {
        Self { restaurants, capacity }
    }
}

#[async_trait]
impl Tool for CancelReservationTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: CANCEL_NAME,
            description: "Cancel a reservation by id and release its seats",
            args: vec![ArgSpec::required("reservation_id", ArgKind::String)],
            idempotent: true,
            accepts_idempotency_token: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResponse, ToolError> {
        let reservation_id = ReservationId(call.str_arg("reservation_id")?.to_string());

        let outcome = match self.capacity.cancel(&reservation_id).await {
            Ok(outcome) => outcome,
            Err(RepositoryError::NotFound(id)) => {
                return Ok(ToolResponse::Declined {
                    reason: DeclineReason::NotFound,
                    data: json!({ "reservation_id": id.0 }),
                })
            }
            Err(error) => return Err(error.into()),
        };

        let record = outcome.record();
        let restaurant = self.restaurants.find_by_id(&record.restaurant_id).await?;
        let mut data = match restaurant {
            Some(restaurant) => reservation_json(record, &restaurant),
            None => json!({
                "reservation_id": record.id.0,
                "restaurant_id": record.restaurant_id.0,
                "restaurant_name": record.restaurant_id.0,
                "date": record.date.format("%Y-%m-%d").to_string(),
                "time": record.time.format("%H:%M").to_string(),
                "party_size": record.party_size,
                "status": record.status.as_str(),
            }),
        };
        data["already_cancelled"] = json!(matches!(outcome, CancelOutcome::AlreadyCancelled(_)));
        Ok(ToolResponse::Completed { data })
    }
}

fn reservation_json(record: &ReservationRecord, restaurant: &Restaurant) -> serde_json::Value {
    json!({
        "reservation_id": record.id.0,
        "restaurant_id": record.restaurant_id.0,
        "restaurant_name": restaurant.name,
        "city": restaurant.city,
        "date": record.date.format("%Y-%m-%d").to_string(),
        "time": record.time.format("%H:%M").to_string(),
        "party_size": record.party_size,
        "customer_name": record.customer_name,
        "status": record.status.as_str(),
    })
}
