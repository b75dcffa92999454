use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use concierge_core::domain::loyalty::LoyaltyProfile;
use concierge_core::domain::reservation::{
    CancelOutcome, CapacityKey, CapacitySlot, ReservationId, ReservationRecord, ReserveOutcome,
    ReserveRequest,
};
use concierge_core::domain::restaurant::{Restaurant, RestaurantFilter, RestaurantId};
use concierge_core::domain::venue::{Feedback, MenuItem, VenueEvent};

pub mod capacity;
pub mod loyalty;
pub mod memory;
pub mod restaurant;
pub mod venue;

pub use capacity::SqlCapacityStore;
pub use loyalty::SqlLoyaltyRepository;
pub use memory::{
    InMemoryCapacityStore, InMemoryLoyaltyRepository, InMemoryRestaurantRepository,
    InMemoryVenueRepository,
};
pub use restaurant::SqlRestaurantRepository;
pub use venue::SqlVenueRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("reservation `{0}` was not found")]
    NotFound(ReservationId),
    #[error("unknown restaurant `{0}`")]
    UnknownRestaurant(RestaurantId),
    #[error("idempotency token belongs to reservation `{0}`, which is no longer confirmed")]
    TokenReused(ReservationId),
}

/// Authoritative seat ledger.
///
/// `reserve` is atomic per [`CapacityKey`]: the availability check, the counter
/// increment and the reservation insert happen as one step, so the confirmed
/// party sizes for a key always sum to its `seats_reserved`. A repeated token
/// replays its reservation only while that reservation is still confirmed;
/// otherwise `reserve` fails with [`RepositoryError::TokenReused`].
#[async_trait]
pub trait CapacityStore: Send + Sync {
    async fn reserve(&self, request: ReserveRequest) -> Result<ReserveOutcome, RepositoryError>;

    /// Releases the seats once. A second cancel returns `AlreadyCancelled`.
    async fn cancel(&self, id: &ReservationId) -> Result<CancelOutcome, RepositoryError>;

    async fn check_availability(&self, key: &CapacityKey) -> Result<u32, RepositoryError>;

    async fn capacity(&self, key: &CapacityKey) -> Result<CapacitySlot, RepositoryError>;

    async fn find_reservation(
        &self,
        id: &ReservationId,
    ) -> Result<Option<ReservationRecord>, RepositoryError>;

    async fn list_reservations(
        &self,
        key: &CapacityKey,
    ) -> Result<Vec<ReservationRecord>, RepositoryError>;
}

#[async_trait]
pub trait RestaurantRepository: Send + Sync {
    async fn find_by_id(&self, id: &RestaurantId) -> Result<Option<Restaurant>, RepositoryError>;

    /// Matches ordered by rating (highest first), then average price.
    async fn search(&self, filter: &RestaurantFilter) -> Result<Vec<Restaurant>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Restaurant>, RepositoryError>;

    async fn save(&self, restaurant: Restaurant) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait LoyaltyRepository: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<LoyaltyProfile>, RepositoryError>;
    async fn save(&self, profile: LoyaltyProfile) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("column `{column}` holds out-of-range value {value}"))
    })
}

/// Menus, events and guest feedback for catalog restaurants.
#[async_trait]
pub trait VenueRepository: Send + Sync {
    /// Signature dishes first, then by price. `category` matches case-insensitively.
    async fn menu(
        &self,
        restaurant: &RestaurantId,
        category: Option<&str>,
    ) -> Result<Vec<MenuItem>, RepositoryError>;

    /// Events dated `from..=until`, earliest first.
    async fn events_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<VenueEvent>, RepositoryError>;

    async fn record_feedback(&self, feedback: Feedback) -> Result<(), RepositoryError>;

    /// Newest first.
    async fn feedback_for(
        &self,
        restaurant: &RestaurantId,
    ) -> Result<Vec<Feedback>, RepositoryError>;

    async fn save_menu_item(&self, item: MenuItem) -> Result<(), RepositoryError>;

    async fn save_event(&self, event: VenueEvent) -> Result<(), RepositoryError>;
}
