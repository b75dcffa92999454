use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use concierge_core::domain::reservation::CapacityKey;
use concierge_core::domain::restaurant::RestaurantId;
use concierge_db::repositories::{CapacityStore, RepositoryError, RestaurantRepository};

use super::{
    parse_slot_args, ArgKind, ArgSpec, DeclineReason, Tool, ToolCall, ToolError, ToolResponse,
    ToolSpec,
};

pub const NAME: &str = "check_availability";

pub struct CheckAvailabilityTool {
    restaurants: Arc<dyn RestaurantRepository>,
    capacity: Arc<dyn CapacityStore>,
}

impl CheckAvailabilityTool {
    pub fn new(
        restaurants: Arc<dyn RestaurantRepository>,
        capacity: Arc<dyn CapacityStore>,
    ) -> Self {
        Self { restaurants, capacity }
    }
}

#[async_trait]
impl Tool for CheckAvailabilityTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: NAME,
            description: "Seats still free at one restaurant for a date and time",
            args: vec![
                ArgSpec::required("restaurant_id", ArgKind::String),
                ArgSpec::required("date", ArgKind::String),
                ArgSpec::required("time", ArgKind::String),
                ArgSpec::optional("party_size", ArgKind::Integer),
            ],
            idempotent: true,
            accepts_idempotency_token: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResponse, ToolError> {
        let restaurant_id = RestaurantId(call.str_arg("restaurant_id")?.to_string());
        let (date, time) = parse_slot_args(call, call.str_arg("date")?, call.str_arg("time")?)?;
        let party_size = call.opt_u32_arg("party_size")?;

        let Some(restaurant) = self.restaurants.find_by_id(&restaurant_id).await? else {
            return Ok(unknown_restaurant(&restaurant_id));
        };

        let key = CapacityKey::new(restaurant_id.clone(), date, time);
        let slot = match self.capacity.capacity(&key).await {
            Ok(slot) => slot,
            Err(RepositoryError::UnknownRestaurant(id)) => return Ok(unknown_restaurant(&id)),
            Err(error) => return Err(error.into()),
        };
        let seats_available = slot.seats_available();

        Ok(ToolResponse::Completed {
            data: json!({
                "restaurant_id": restaurant.id.0,
                "restaurant_name": restaurant.name,
                "date": date.format("%Y-%m-%d").to_string(),
                "time": time.format("%H:%M").to_string(),
                "seats_available": seats_available,
                "total_seats": slot.total_seats,
                "party_size": party_size,
                "fits": party_size.map(|size| size <= seats_available),
            }),
        })
    }
}

pub(crate) fn unknown_restaurant(id: &RestaurantId) -> ToolResponse {
    ToolResponse::Declined {
        reason: DeclineReason::UnknownRestaurant,
        data: json!({ "restaurant_id": id.0 }),
    }
}
